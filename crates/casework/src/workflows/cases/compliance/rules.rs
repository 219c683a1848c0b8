use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{CaseStage, Disposition, DocumentTag, OrganizationId, ServiceType};
use super::super::snapshot::CaseField;

/// Identifier wrapper for compliance rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuleId(pub u64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule-{:06}", self.0)
    }
}

/// How strongly an unsatisfied rule holds a case back.
///
/// Ordering is ascending by weight: `Warning < Blocker`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Surfaced to staff; never prevents the case from advancing.
    Warning,
    /// Prevents progression while unresolved.
    Blocker,
}

impl Severity {
    pub const fn gates_progression(self) -> bool {
        matches!(self, Self::Blocker)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Warning => "WARNING",
            Self::Blocker => "BLOCKER",
        }
    }
}

/// When a rule applies to a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleCondition {
    Always,
    DispositionEquals {
        disposition: Disposition,
    },
    ServiceTypeEquals {
        service_type: ServiceType,
    },
    #[serde(rename = "STAGE_GTE")]
    StageAtLeast {
        stage: CaseStage,
    },
    StageEquals {
        stage: CaseStage,
    },
    FieldPresent {
        field: CaseField,
    },
}

/// What an applicable rule needs before it stops blocking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleRequirement {
    DocumentExists {
        tag: DocumentTag,
    },
    DocumentSigned {
        tag: DocumentTag,
        /// When false, a generated (unsigned) copy is also accepted.
        requires_signed: bool,
    },
    FieldCompleted {
        field: CaseField,
    },
    SignatureCompleted {
        tag: DocumentTag,
    },
}

/// Validated, organization-agnostic rule content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub condition: RuleCondition,
    pub requirement: RuleRequirement,
    pub severity: Severity,
    pub is_active: bool,
}

/// Persisted rule. The engine only ever reads these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceRule {
    pub rule_id: RuleId,
    pub organization_id: OrganizationId,
    #[serde(flatten)]
    pub definition: RuleDefinition,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComplianceRule {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn severity(&self) -> Severity {
        self.definition.severity
    }

    pub fn is_active(&self) -> bool {
        self.definition.is_active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionKind {
    Always,
    DispositionEquals,
    ServiceTypeEquals,
    #[serde(rename = "STAGE_GTE")]
    StageGte,
    StageEquals,
    FieldPresent,
}

impl ConditionKind {
    const fn code(self) -> &'static str {
        match self {
            Self::Always => "ALWAYS",
            Self::DispositionEquals => "DISPOSITION_EQUALS",
            Self::ServiceTypeEquals => "SERVICE_TYPE_EQUALS",
            Self::StageGte => "STAGE_GTE",
            Self::StageEquals => "STAGE_EQUALS",
            Self::FieldPresent => "FIELD_PRESENT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequirementKind {
    DocumentExists,
    DocumentSigned,
    FieldCompleted,
    SignatureCompleted,
}

impl RequirementKind {
    const fn code(self) -> &'static str {
        match self {
            Self::DocumentExists => "DOCUMENT_EXISTS",
            Self::DocumentSigned => "DOCUMENT_SIGNED",
            Self::FieldCompleted => "FIELD_COMPLETED",
            Self::SignatureCompleted => "SIGNATURE_COMPLETED",
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_severity() -> Severity {
    Severity::Blocker
}

/// Flat authoring shape submitted by organization admins.
///
/// Operands are loosely typed here; [`RuleDraft::into_definition`] is the only
/// way into a [`RuleDefinition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub condition_type: ConditionKind,
    #[serde(default)]
    pub condition_field: Option<String>,
    #[serde(default)]
    pub condition_value: Option<String>,
    pub requirement_type: RequirementKind,
    #[serde(default)]
    pub requirement_tag: Option<String>,
    #[serde(default)]
    pub requirement_field: Option<String>,
    #[serde(default = "default_true")]
    pub requires_signed: bool,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl RuleDraft {
    pub fn into_definition(self) -> Result<RuleDefinition, RuleValidationError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(RuleValidationError::BlankName);
        }

        let condition = self.condition()?;
        let requirement = self.requirement()?;

        Ok(RuleDefinition {
            name,
            description: self
                .description
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
            condition,
            requirement,
            severity: self.severity,
            is_active: self.is_active,
        })
    }

    fn condition(&self) -> Result<RuleCondition, RuleValidationError> {
        let kind = self.condition_type.code();
        let value = || operand(kind, "conditionValue", self.condition_value.as_deref());

        Ok(match self.condition_type {
            ConditionKind::Always => RuleCondition::Always,
            ConditionKind::DispositionEquals => {
                let raw = value()?;
                RuleCondition::DispositionEquals {
                    disposition: Disposition::parse(raw)
                        .ok_or_else(|| invalid("conditionValue", raw, "a disposition"))?,
                }
            }
            ConditionKind::ServiceTypeEquals => {
                let raw = value()?;
                RuleCondition::ServiceTypeEquals {
                    service_type: ServiceType::parse(raw)
                        .ok_or_else(|| invalid("conditionValue", raw, "a service type"))?,
                }
            }
            ConditionKind::StageGte => {
                let raw = value()?;
                RuleCondition::StageAtLeast {
                    stage: CaseStage::parse(raw)
                        .ok_or_else(|| invalid("conditionValue", raw, "a case stage"))?,
                }
            }
            ConditionKind::StageEquals => {
                let raw = value()?;
                RuleCondition::StageEquals {
                    stage: CaseStage::parse(raw)
                        .ok_or_else(|| invalid("conditionValue", raw, "a case stage"))?,
                }
            }
            ConditionKind::FieldPresent => {
                let raw = operand(kind, "conditionField", self.condition_field.as_deref())?;
                RuleCondition::FieldPresent {
                    field: CaseField::parse(raw)
                        .map_err(|_| invalid("conditionField", raw, "a case field"))?,
                }
            }
        })
    }

    fn requirement(&self) -> Result<RuleRequirement, RuleValidationError> {
        let kind = self.requirement_type.code();
        let tag = || {
            operand(kind, "requirementTag", self.requirement_tag.as_deref()).map(DocumentTag::new)
        };

        Ok(match self.requirement_type {
            RequirementKind::DocumentExists => RuleRequirement::DocumentExists { tag: tag()? },
            RequirementKind::DocumentSigned => RuleRequirement::DocumentSigned {
                tag: tag()?,
                requires_signed: self.requires_signed,
            },
            RequirementKind::SignatureCompleted => {
                RuleRequirement::SignatureCompleted { tag: tag()? }
            }
            RequirementKind::FieldCompleted => {
                let raw = operand(kind, "requirementField", self.requirement_field.as_deref())?;
                RuleRequirement::FieldCompleted {
                    field: CaseField::parse(raw)
                        .map_err(|_| invalid("requirementField", raw, "a case field"))?,
                }
            }
        })
    }
}

fn operand<'a>(
    kind: &'static str,
    operand: &'static str,
    value: Option<&'a str>,
) -> Result<&'a str, RuleValidationError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(RuleValidationError::MissingOperand { kind, operand })
}

fn invalid(operand: &'static str, value: &str, expected: &'static str) -> RuleValidationError {
    RuleValidationError::InvalidOperand {
        operand,
        value: value.to_string(),
        expected,
    }
}

/// Malformed rule definition; rejected before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleValidationError {
    #[error("rule name must not be blank")]
    BlankName,
    #[error("{kind} rules require {operand}")]
    MissingOperand {
        kind: &'static str,
        operand: &'static str,
    },
    #[error("{operand} '{value}' is not {expected}")]
    InvalidOperand {
        operand: &'static str,
        value: String,
        expected: &'static str,
    },
}
