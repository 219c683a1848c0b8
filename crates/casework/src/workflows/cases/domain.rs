use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::snapshot::{CaseField, FieldValue};

/// Tenant boundary for cases, rules, and blockers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrganizationId(pub String);

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for tracked cases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaseId(pub String);

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Workflow stages in their fixed progression order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseStage {
    Intake,
    Arrangement,
    Documents,
    Signatures,
    Service,
    Disposition,
    Close,
}

impl CaseStage {
    pub const fn ordered() -> [Self; 7] {
        [
            Self::Intake,
            Self::Arrangement,
            Self::Documents,
            Self::Signatures,
            Self::Service,
            Self::Disposition,
            Self::Close,
        ]
    }

    pub const fn ordinal(self) -> u8 {
        match self {
            Self::Intake => 0,
            Self::Arrangement => 1,
            Self::Documents => 2,
            Self::Signatures => 3,
            Self::Service => 4,
            Self::Disposition => 5,
            Self::Close => 6,
        }
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Intake => "INTAKE",
            Self::Arrangement => "ARRANGEMENT",
            Self::Documents => "DOCUMENTS",
            Self::Signatures => "SIGNATURES",
            Self::Service => "SERVICE",
            Self::Disposition => "DISPOSITION",
            Self::Close => "CLOSE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ordered()
            .into_iter()
            .find(|stage| stage.code().eq_ignore_ascii_case(raw))
    }
}

/// Final disposition of the remains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Disposition {
    Burial,
    Cremation,
    Entombment,
    Donation,
    Transfer,
}

impl Disposition {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Burial,
            Self::Cremation,
            Self::Entombment,
            Self::Donation,
            Self::Transfer,
        ]
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Burial => "BURIAL",
            Self::Cremation => "CREMATION",
            Self::Entombment => "ENTOMBMENT",
            Self::Donation => "DONATION",
            Self::Transfer => "TRANSFER",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ordered()
            .into_iter()
            .find(|value| value.code().eq_ignore_ascii_case(raw))
    }
}

/// Service arrangement selected for the case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    Traditional,
    Memorial,
    Graveside,
    DirectCremation,
    DirectBurial,
}

impl ServiceType {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Traditional,
            Self::Memorial,
            Self::Graveside,
            Self::DirectCremation,
            Self::DirectBurial,
        ]
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Traditional => "TRADITIONAL",
            Self::Memorial => "MEMORIAL",
            Self::Graveside => "GRAVESIDE",
            Self::DirectCremation => "DIRECT_CREMATION",
            Self::DirectBurial => "DIRECT_BURIAL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ordered()
            .into_iter()
            .find(|value| value.code().eq_ignore_ascii_case(raw))
    }
}

/// Organization-defined document tag (e.g. `GPL`, `AUTHORIZATION_CREMATION`).
///
/// Tags compare case-insensitively; they are stored upper-cased and trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct DocumentTag(String);

impl DocumentTag {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for DocumentTag {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for DocumentTag {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for DocumentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Draft,
    Generated,
    Uploaded,
    SentForSignature,
    Signed,
    Voided,
}

impl DocumentStatus {
    /// True once the document exists beyond a draft and has not been voided.
    pub const fn is_on_file(self) -> bool {
        matches!(
            self,
            Self::Generated | Self::Uploaded | Self::SentForSignature | Self::Signed
        )
    }
}

/// Document attached to a case by the document collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseDocument {
    pub document_id: String,
    pub tag: DocumentTag,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub name: String,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// E-signature request as reported by the signature provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRequest {
    pub request_id: String,
    pub tag: DocumentTag,
    pub signers: Vec<Signer>,
    pub requested_at: DateTime<Utc>,
}

impl SignatureRequest {
    /// A request with nobody on it has not been signed by anyone.
    pub fn is_complete(&self) -> bool {
        !self.signers.is_empty()
            && self
                .signers
                .iter()
                .all(|signer| signer.completed_at.is_some())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decedent {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
    pub place_of_death: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Informant {
    pub name: Option<String>,
    pub relationship: Option<String>,
    pub phone: Option<String>,
}

/// Case state supplied by the case-tracking collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_id: CaseId,
    pub organization_id: OrganizationId,
    pub stage: CaseStage,
    #[serde(default)]
    pub disposition: Option<Disposition>,
    #[serde(default)]
    pub service_type: Option<ServiceType>,
    #[serde(default)]
    pub decedent: Decedent,
    #[serde(default)]
    pub informant: Informant,
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
    #[serde(default)]
    pub documents: Vec<CaseDocument>,
    #[serde(default)]
    pub signature_requests: Vec<SignatureRequest>,
}

impl CaseRecord {
    pub fn new(case_id: CaseId, organization_id: OrganizationId, stage: CaseStage) -> Self {
        Self {
            case_id,
            organization_id,
            stage,
            disposition: None,
            service_type: None,
            decedent: Decedent::default(),
            informant: Informant::default(),
            custom_fields: BTreeMap::new(),
            documents: Vec::new(),
            signature_requests: Vec::new(),
        }
    }

    /// Read a field through the same keys rules reference.
    pub fn field(&self, field: &CaseField) -> Option<FieldValue> {
        let text = |value: &Option<String>| value.clone().map(FieldValue::Text);
        match field {
            CaseField::DecedentFirstName => text(&self.decedent.first_name),
            CaseField::DecedentLastName => text(&self.decedent.last_name),
            CaseField::DecedentDateOfBirth => self.decedent.date_of_birth.map(FieldValue::Date),
            CaseField::DecedentDateOfDeath => self.decedent.date_of_death.map(FieldValue::Date),
            CaseField::DecedentPlaceOfDeath => text(&self.decedent.place_of_death),
            CaseField::InformantName => text(&self.informant.name),
            CaseField::InformantRelationship => text(&self.informant.relationship),
            CaseField::InformantPhone => text(&self.informant.phone),
            CaseField::Custom(name) => self.custom_fields.get(name).cloned().map(FieldValue::Text),
        }
    }

    /// Write (or clear, with `None`) a field. Date fields expect `YYYY-MM-DD`.
    pub fn set_field(
        &mut self,
        field: &CaseField,
        value: Option<&str>,
    ) -> Result<(), MutationError> {
        let value = value.map(str::trim).filter(|value| !value.is_empty());
        let text = value.map(str::to_string);
        match field {
            CaseField::DecedentFirstName => self.decedent.first_name = text,
            CaseField::DecedentLastName => self.decedent.last_name = text,
            CaseField::DecedentDateOfBirth => {
                self.decedent.date_of_birth = parse_date(field, value)?
            }
            CaseField::DecedentDateOfDeath => {
                self.decedent.date_of_death = parse_date(field, value)?
            }
            CaseField::DecedentPlaceOfDeath => self.decedent.place_of_death = text,
            CaseField::InformantName => self.informant.name = text,
            CaseField::InformantRelationship => self.informant.relationship = text,
            CaseField::InformantPhone => self.informant.phone = text,
            CaseField::Custom(name) => match text {
                Some(text) => {
                    self.custom_fields.insert(name.clone(), text);
                }
                None => {
                    self.custom_fields.remove(name);
                }
            },
        }
        Ok(())
    }

    /// Apply a case-state change reported by a collaborator.
    pub fn apply(&mut self, mutation: &CaseMutation) -> Result<(), MutationError> {
        match mutation {
            CaseMutation::StageChanged { stage } => self.stage = *stage,
            CaseMutation::DispositionChanged { disposition } => self.disposition = *disposition,
            CaseMutation::ServiceTypeChanged { service_type } => {
                self.service_type = *service_type
            }
            CaseMutation::FieldEdited { field, value } => {
                self.set_field(field, Some(value.as_str()))?
            }
            CaseMutation::FieldCleared { field } => self.set_field(field, None)?,
            CaseMutation::DocumentRecorded { document } => {
                match self
                    .documents
                    .iter_mut()
                    .find(|existing| existing.document_id == document.document_id)
                {
                    Some(existing) => existing.status = document.status,
                    None => self.documents.push(document.clone()),
                }
            }
            CaseMutation::SignatureRequested { request } => {
                if self
                    .signature_requests
                    .iter()
                    .any(|existing| existing.request_id == request.request_id)
                {
                    return Err(MutationError::DuplicateSignatureRequest {
                        request_id: request.request_id.clone(),
                    });
                }
                self.signature_requests.push(request.clone());
            }
            CaseMutation::SignerCompleted {
                request_id,
                signer,
                completed_at,
            } => {
                let request = self
                    .signature_requests
                    .iter_mut()
                    .find(|request| &request.request_id == request_id)
                    .ok_or_else(|| MutationError::UnknownSignatureRequest {
                        request_id: request_id.clone(),
                    })?;
                let entry = request
                    .signers
                    .iter_mut()
                    .find(|entry| entry.name.eq_ignore_ascii_case(signer))
                    .ok_or_else(|| MutationError::UnknownSigner {
                        request_id: request_id.clone(),
                        signer: signer.clone(),
                    })?;
                entry.completed_at.get_or_insert(*completed_at);
            }
        }
        Ok(())
    }
}

fn parse_date(field: &CaseField, value: Option<&str>) -> Result<Option<NaiveDate>, MutationError> {
    value
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                MutationError::InvalidFieldValue {
                    field: field.key(),
                    value: raw.to_string(),
                }
            })
        })
        .transpose()
}

/// Case-relevant change; every variant triggers reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseMutation {
    StageChanged {
        stage: CaseStage,
    },
    DispositionChanged {
        disposition: Option<Disposition>,
    },
    ServiceTypeChanged {
        service_type: Option<ServiceType>,
    },
    FieldEdited {
        field: CaseField,
        value: String,
    },
    FieldCleared {
        field: CaseField,
    },
    DocumentRecorded {
        document: CaseDocument,
    },
    SignatureRequested {
        request: SignatureRequest,
    },
    SignerCompleted {
        request_id: String,
        signer: String,
        completed_at: DateTime<Utc>,
    },
}

/// Rejected case mutation; the case is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    #[error("field {field} cannot hold '{value}' (expected YYYY-MM-DD)")]
    InvalidFieldValue { field: String, value: String },
    #[error("signature request {request_id} not found on case")]
    UnknownSignatureRequest { request_id: String },
    #[error("signature request {request_id} already exists on case")]
    DuplicateSignatureRequest { request_id: String },
    #[error("signer {signer} is not part of signature request {request_id}")]
    UnknownSigner { request_id: String, signer: String },
}
