use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

use super::super::domain::{CaseId, CaseMutation, CaseRecord, MutationError, OrganizationId};
use super::blockers::{Blocker, BlockerView, CaseComplianceStatus, ReconciliationOutcome};
use super::catalog::{CatalogError, RuleCatalog};
use super::reconciler::{BlockerReconciler, ReconcileError};
use super::repository::{BlockerRepository, CaseDirectory, RepositoryError, RuleRepository};
use super::rules::{ComplianceRule, RuleDraft, RuleId, RuleValidationError};

/// Rule with its count of unresolved blockers, for rule-management screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleSummary {
    #[serde(flatten)]
    pub rule: ComplianceRule,
    pub open_blockers: usize,
}

/// Service composing the rule catalog, reconciler, and blocker queries.
pub struct ComplianceService<S, C> {
    catalog: RuleCatalog<S>,
    store: Arc<S>,
    cases: Arc<C>,
    reconciler: BlockerReconciler<S, C>,
}

impl<S, C> ComplianceService<S, C>
where
    S: RuleRepository + BlockerRepository + 'static,
    C: CaseDirectory + 'static,
{
    pub fn new(store: Arc<S>, cases: Arc<C>) -> Self {
        Self {
            catalog: RuleCatalog::new(store.clone()),
            reconciler: BlockerReconciler::new(store.clone(), cases.clone()),
            store,
            cases,
        }
    }

    pub fn create_rule(
        &self,
        organization: &OrganizationId,
        draft: RuleDraft,
    ) -> Result<ComplianceRule, ComplianceError> {
        Ok(self.catalog.create(organization, draft, Utc::now())?)
    }

    pub fn update_rule(
        &self,
        organization: &OrganizationId,
        rule_id: RuleId,
        draft: RuleDraft,
    ) -> Result<ComplianceRule, ComplianceError> {
        Ok(self
            .catalog
            .update(organization, rule_id, draft, Utc::now())?)
    }

    /// Existing blockers for a disabled rule resolve on the case's next reconciliation.
    pub fn set_rule_active(
        &self,
        organization: &OrganizationId,
        rule_id: RuleId,
        active: bool,
    ) -> Result<ComplianceRule, ComplianceError> {
        Ok(self
            .catalog
            .set_active(organization, rule_id, active, Utc::now())?)
    }

    pub fn list_rules(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<RuleSummary>, ComplianceError> {
        let rules = self.catalog.rules(organization)?;
        let counts = self.store.open_counts_by_rule(organization)?;
        Ok(rules
            .into_iter()
            .map(|rule| RuleSummary {
                open_blockers: counts.get(&rule.rule_id).copied().unwrap_or(0),
                rule,
            })
            .collect())
    }

    /// Current case record as the engine sees it.
    pub fn case(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<CaseRecord, ComplianceError> {
        self.cases
            .fetch(organization, case_id)?
            .filter(|record| &record.organization_id == organization)
            .ok_or_else(|| ComplianceError::CaseNotFound(case_id.clone()))
    }

    /// Register (or replace) a case record and bring its blockers up to date.
    ///
    /// If reconciliation fails the replaced record comes back, or a new case
    /// is dropped again.
    pub fn register_case(
        &self,
        record: CaseRecord,
    ) -> Result<ReconciliationOutcome, ComplianceError> {
        let organization = record.organization_id.clone();
        let case_id = record.case_id.clone();
        self.reconciler.serialized(&case_id, || {
            let previous = self.cases.fetch(&organization, &case_id)?;
            self.cases.store(record)?;

            match self
                .reconciler
                .reconcile_serialized(&organization, &case_id, Utc::now())
            {
                Ok(outcome) => Ok(outcome),
                Err(err) => {
                    warn!(
                        case_id = %case_id,
                        error = %err,
                        "reconciliation failed; reverting case registration"
                    );
                    self.restore(&organization, &case_id, previous);
                    Err(err.into())
                }
            }
        })
    }

    pub fn reconcile(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<ReconciliationOutcome, ComplianceError> {
        self.reconcile_at(organization, case_id, Utc::now())
    }

    pub fn reconcile_at(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationOutcome, ComplianceError> {
        Ok(self.reconciler.reconcile_at(organization, case_id, now)?)
    }

    /// Reconcile every case in the organization, e.g. after a rule edit.
    ///
    /// Cases that disappear mid-pass are skipped; any other failure stops the pass.
    pub fn reconcile_organization(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<ReconciliationOutcome>, ComplianceError> {
        let now = Utc::now();
        let mut outcomes = Vec::new();
        for case_id in self.cases.case_ids(organization)? {
            match self.reconciler.reconcile_at(organization, &case_id, now) {
                Ok(outcome) => outcomes.push(outcome),
                Err(ReconcileError::CaseNotFound(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(outcomes)
    }

    pub fn apply_mutation(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
        mutation: CaseMutation,
    ) -> Result<ReconciliationOutcome, ComplianceError> {
        self.apply_mutation_at(organization, case_id, mutation, Utc::now())
    }

    /// Apply a case mutation and reconcile synchronously.
    ///
    /// If reconciliation fails the previous case record is restored, so the
    /// mutation and its blocker delta land together or not at all.
    pub fn apply_mutation_at(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
        mutation: CaseMutation,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationOutcome, ComplianceError> {
        self.reconciler.serialized(case_id, || {
            let previous = self
                .cases
                .fetch(organization, case_id)?
                .ok_or_else(|| ComplianceError::CaseNotFound(case_id.clone()))?;

            let mut updated = previous.clone();
            updated.apply(&mutation)?;
            self.cases.store(updated)?;

            match self
                .reconciler
                .reconcile_serialized(organization, case_id, now)
            {
                Ok(outcome) => Ok(outcome),
                Err(err) => {
                    warn!(
                        case_id = %case_id,
                        error = %err,
                        "reconciliation failed; reverting case mutation"
                    );
                    self.restore(organization, case_id, Some(previous));
                    Err(err.into())
                }
            }
        })
    }

    /// Unresolved blockers for one case, most severe first, then oldest first.
    pub fn outstanding_blockers(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<Vec<BlockerView>, ComplianceError> {
        self.require_case(organization, case_id)?;
        let open = self.store.open_for_case(organization, case_id)?;
        let rules = self.catalog.rules(organization)?;
        Ok(BlockerView::outstanding(&open, &rules))
    }

    /// Open blockers across the organization's known cases.
    ///
    /// Rows left behind for cases the directory no longer holds cannot be
    /// reconciled and are left out.
    pub fn organization_blockers(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<BlockerView>, ComplianceError> {
        let known: HashSet<CaseId> = self.cases.case_ids(organization)?.into_iter().collect();
        let open: Vec<Blocker> = self
            .store
            .open_for_organization(organization)?
            .into_iter()
            .filter(|blocker| known.contains(&blocker.case_id))
            .collect();
        let rules = self.catalog.rules(organization)?;
        Ok(BlockerView::outstanding(&open, &rules))
    }

    /// Every blocker row for the case, open and resolved, oldest first.
    pub fn blocker_history(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<Vec<Blocker>, ComplianceError> {
        self.require_case(organization, case_id)?;
        let mut history = self.store.history_for_case(organization, case_id)?;
        history.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then(left.blocker_id.cmp(&right.blocker_id))
        });
        Ok(history)
    }

    pub fn case_status(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<CaseComplianceStatus, ComplianceError> {
        let outstanding = self.outstanding_blockers(organization, case_id)?;
        Ok(CaseComplianceStatus::from_views(case_id.clone(), outstanding))
    }

    /// Only `BLOCKER` severity prevents progression.
    pub fn is_blocked(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<bool, ComplianceError> {
        Ok(self.case_status(organization, case_id)?.blocked)
    }

    fn restore(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
        previous: Option<CaseRecord>,
    ) {
        let restored = match previous {
            Some(record) => self.cases.store(record),
            None => self.cases.remove(organization, case_id),
        };
        if let Err(err) = restored {
            error!(
                case_id = %case_id,
                error = %err,
                "unable to restore case after failed reconciliation"
            );
        }
    }

    fn require_case(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<(), ComplianceError> {
        self.case(organization, case_id).map(|_| ())
    }
}

/// Error raised by the compliance service.
#[derive(Debug, thiserror::Error)]
pub enum ComplianceError {
    #[error(transparent)]
    Validation(#[from] RuleValidationError),
    #[error(transparent)]
    InvalidMutation(#[from] MutationError),
    #[error("case {0} not found")]
    CaseNotFound(CaseId),
    #[error("compliance rule {0} not found")]
    RuleNotFound(RuleId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<CatalogError> for ComplianceError {
    fn from(value: CatalogError) -> Self {
        match value {
            CatalogError::Validation(err) => Self::Validation(err),
            CatalogError::RuleNotFound(rule_id) => Self::RuleNotFound(rule_id),
            CatalogError::Repository(err) => Self::Repository(err),
        }
    }
}

impl From<ReconcileError> for ComplianceError {
    fn from(value: ReconcileError) -> Self {
        match value {
            ReconcileError::CaseNotFound(case_id) => Self::CaseNotFound(case_id),
            ReconcileError::Catalog(err) => Self::from(err),
            ReconcileError::Repository(err) => Self::Repository(err),
        }
    }
}
