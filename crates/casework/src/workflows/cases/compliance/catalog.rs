use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::super::domain::OrganizationId;
use super::repository::{RepositoryError, RuleRepository};
use super::rules::{ComplianceRule, RuleDraft, RuleId, RuleValidationError};

/// Owns the organization-scoped rule set.
pub struct RuleCatalog<R> {
    repository: Arc<R>,
}

impl<R> Clone for RuleCatalog<R> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

impl<R> RuleCatalog<R>
where
    R: RuleRepository,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn create(
        &self,
        organization: &OrganizationId,
        draft: RuleDraft,
        now: DateTime<Utc>,
    ) -> Result<ComplianceRule, CatalogError> {
        let definition = draft.into_definition().inspect_err(|err| {
            warn!(organization = %organization, error = %err, "rejected rule draft");
        })?;
        let rule = self.repository.insert_rule(organization, definition, now)?;
        info!(
            organization = %organization,
            rule_id = %rule.rule_id,
            name = rule.name(),
            "compliance rule created"
        );
        Ok(rule)
    }

    /// Replace a rule's definition, keeping its id and creation time.
    pub fn update(
        &self,
        organization: &OrganizationId,
        rule_id: RuleId,
        draft: RuleDraft,
        now: DateTime<Utc>,
    ) -> Result<ComplianceRule, CatalogError> {
        let definition = draft.into_definition()?;
        let mut rule = self.require(organization, rule_id)?;
        rule.definition = definition;
        rule.updated_at = now;
        self.repository.update_rule(rule.clone())?;
        info!(organization = %organization, rule_id = %rule_id, "compliance rule updated");
        Ok(rule)
    }

    /// Soft-enable or soft-disable a rule. Rules are never deleted.
    pub fn set_active(
        &self,
        organization: &OrganizationId,
        rule_id: RuleId,
        active: bool,
        now: DateTime<Utc>,
    ) -> Result<ComplianceRule, CatalogError> {
        let mut rule = self.require(organization, rule_id)?;
        if rule.is_active() == active {
            return Ok(rule);
        }
        rule.definition.is_active = active;
        rule.updated_at = now;
        self.repository.update_rule(rule.clone())?;
        info!(
            organization = %organization,
            rule_id = %rule_id,
            active,
            "compliance rule activation changed"
        );
        Ok(rule)
    }

    /// Every rule, active or not.
    pub fn rules(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<ComplianceRule>, CatalogError> {
        Ok(self.repository.rules(organization)?)
    }

    /// Rules the reconciler evaluates.
    pub fn active_rules(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<ComplianceRule>, CatalogError> {
        Ok(self
            .repository
            .rules(organization)?
            .into_iter()
            .filter(ComplianceRule::is_active)
            .collect())
    }

    fn require(
        &self,
        organization: &OrganizationId,
        rule_id: RuleId,
    ) -> Result<ComplianceRule, CatalogError> {
        self.repository
            .fetch_rule(organization, rule_id)?
            .ok_or(CatalogError::RuleNotFound(rule_id))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Validation(#[from] RuleValidationError),
    #[error("compliance rule {0} not found")]
    RuleNotFound(RuleId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
