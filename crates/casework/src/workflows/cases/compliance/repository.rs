use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::super::domain::{CaseId, CaseRecord, OrganizationId};
use super::blockers::{Blocker, ReconciliationOutcome, ReconciliationPlan};
use super::rules::{ComplianceRule, RuleDefinition, RuleId};

/// Storage for organization-scoped rule definitions.
pub trait RuleRepository: Send + Sync {
    /// Rule names are unique per organization; a clash is `Conflict`.
    fn insert_rule(
        &self,
        organization: &OrganizationId,
        definition: RuleDefinition,
        now: DateTime<Utc>,
    ) -> Result<ComplianceRule, RepositoryError>;
    fn update_rule(&self, rule: ComplianceRule) -> Result<(), RepositoryError>;
    fn fetch_rule(
        &self,
        organization: &OrganizationId,
        rule_id: RuleId,
    ) -> Result<Option<ComplianceRule>, RepositoryError>;
    /// Every rule for the organization, active or not, ordered by id.
    fn rules(&self, organization: &OrganizationId) -> Result<Vec<ComplianceRule>, RepositoryError>;
}

/// Storage for blocker rows.
pub trait BlockerRepository: Send + Sync {
    fn open_for_case(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<Vec<Blocker>, RepositoryError>;
    fn open_for_organization(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<Blocker>, RepositoryError>;
    fn history_for_case(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<Vec<Blocker>, RepositoryError>;
    fn open_counts_by_rule(
        &self,
        organization: &OrganizationId,
    ) -> Result<BTreeMap<RuleId, usize>, RepositoryError>;
    /// Write the whole plan atomically, or nothing.
    ///
    /// Opening a rule that already has an unresolved blocker for the case, or
    /// resolving a blocker that is no longer open, is skipped rather than
    /// treated as an error. Only rows actually written are returned.
    fn apply(
        &self,
        plan: &ReconciliationPlan,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationOutcome, RepositoryError>;
}

/// Case-state collaborator supplying the records snapshots are built from.
pub trait CaseDirectory: Send + Sync {
    fn fetch(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<Option<CaseRecord>, RepositoryError>;
    fn store(&self, record: CaseRecord) -> Result<(), RepositoryError>;
    /// Drop a case the organization owns; unknown cases are a no-op.
    fn remove(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<(), RepositoryError>;
    fn case_ids(&self, organization: &OrganizationId) -> Result<Vec<CaseId>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
