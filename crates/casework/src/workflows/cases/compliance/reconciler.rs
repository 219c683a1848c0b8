use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::super::domain::{CaseId, OrganizationId};
use super::super::snapshot::SnapshotAccessor;
use super::blockers::{plan_reconciliation, ReconciliationOutcome};
use super::catalog::{CatalogError, RuleCatalog};
use super::repository::{BlockerRepository, CaseDirectory, RepositoryError, RuleRepository};

/// Keyed lock table serializing work per case.
///
/// Entries are removed once no caller holds or waits on them.
#[derive(Default)]
pub(crate) struct CaseLocks {
    slots: Mutex<HashMap<CaseId, Arc<Mutex<()>>>>,
}

impl CaseLocks {
    pub(crate) fn with_case<T>(&self, case_id: &CaseId, work: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(case_id.clone()).or_default().clone()
        };

        let result = {
            let _serialized = slot.lock().unwrap_or_else(PoisonError::into_inner);
            work()
        };

        drop(slot);
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if slots
            .get(case_id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(case_id);
        }
        result
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Computes and applies the blocker delta for a case.
pub struct BlockerReconciler<S, C> {
    catalog: RuleCatalog<S>,
    store: Arc<S>,
    snapshots: SnapshotAccessor<C>,
    locks: CaseLocks,
}

impl<S, C> BlockerReconciler<S, C>
where
    S: RuleRepository + BlockerRepository,
    C: CaseDirectory,
{
    pub fn new(store: Arc<S>, cases: Arc<C>) -> Self {
        Self {
            catalog: RuleCatalog::new(store.clone()),
            store,
            snapshots: SnapshotAccessor::new(cases),
            locks: CaseLocks::default(),
        }
    }

    pub fn reconcile(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<ReconciliationOutcome, ReconcileError> {
        self.reconcile_at(organization, case_id, Utc::now())
    }

    pub fn reconcile_at(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationOutcome, ReconcileError> {
        self.locks
            .with_case(case_id, || self.reconcile_serialized(organization, case_id, now))
    }

    /// Run `work` while holding the case's reconciliation lock.
    pub(crate) fn serialized<T>(&self, case_id: &CaseId, work: impl FnOnce() -> T) -> T {
        self.locks.with_case(case_id, work)
    }

    /// Callers must already hold the case lock (see [`Self::serialized`]).
    pub(crate) fn reconcile_serialized(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationOutcome, ReconcileError> {
        let snapshot = self
            .snapshots
            .load(organization, case_id)?
            .ok_or_else(|| ReconcileError::CaseNotFound(case_id.clone()))?;
        let rules = self.catalog.active_rules(organization)?;
        let open = self.store.open_for_case(organization, case_id)?;

        let plan = plan_reconciliation(&snapshot, &rules, &open);
        if plan.is_empty() {
            debug!(organization = %organization, case_id = %case_id, "blockers already consistent");
            return Ok(ReconciliationOutcome::empty(case_id.clone()));
        }

        let outcome = self.store.apply(&plan, now)?;
        info!(
            organization = %organization,
            case_id = %case_id,
            opened = outcome.opened.len(),
            resolved = outcome.resolved.len(),
            "reconciled case blockers"
        );
        Ok(outcome)
    }

    #[cfg(test)]
    pub(crate) fn locks(&self) -> &CaseLocks {
        &self.locks
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("case {0} not found")]
    CaseNotFound(CaseId),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
