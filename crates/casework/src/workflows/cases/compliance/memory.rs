use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::super::domain::{CaseId, CaseRecord, OrganizationId};
use super::blockers::{Blocker, BlockerId, ReconciliationOutcome, ReconciliationPlan};
use super::repository::{BlockerRepository, CaseDirectory, RepositoryError, RuleRepository};
use super::rules::{ComplianceRule, RuleDefinition, RuleId};

#[derive(Default)]
struct StoreState {
    next_rule_id: u64,
    next_blocker_id: u64,
    rules: BTreeMap<RuleId, ComplianceRule>,
    blockers: BTreeMap<BlockerId, Blocker>,
}

impl StoreState {
    fn name_taken(
        &self,
        organization: &OrganizationId,
        name: &str,
        except: Option<RuleId>,
    ) -> bool {
        self.rules.values().any(|rule| {
            &rule.organization_id == organization
                && rule.name().eq_ignore_ascii_case(name)
                && Some(rule.rule_id) != except
        })
    }

    fn has_open(&self, case_id: &CaseId, rule_id: RuleId) -> bool {
        self.blockers.values().any(|blocker| {
            blocker.is_open() && &blocker.case_id == case_id && blocker.rule_id == rule_id
        })
    }
}

/// Process-local rule and blocker store.
///
/// All state sits behind one mutex, so `apply` is atomic with respect to every
/// other reader and writer.
#[derive(Default)]
pub struct InMemoryComplianceStore {
    state: Mutex<StoreState>,
}

impl InMemoryComplianceStore {
    fn state(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state.lock().map_err(|_| {
            RepositoryError::Unavailable("compliance store mutex poisoned".to_string())
        })
    }

    /// Every blocker row in id order, for audits and tests.
    pub fn all_blockers(&self) -> Result<Vec<Blocker>, RepositoryError> {
        Ok(self.state()?.blockers.values().cloned().collect())
    }
}

impl RuleRepository for InMemoryComplianceStore {
    fn insert_rule(
        &self,
        organization: &OrganizationId,
        definition: RuleDefinition,
        now: DateTime<Utc>,
    ) -> Result<ComplianceRule, RepositoryError> {
        let mut state = self.state()?;
        if state.name_taken(organization, &definition.name, None) {
            return Err(RepositoryError::Conflict);
        }

        state.next_rule_id += 1;
        let rule = ComplianceRule {
            rule_id: RuleId(state.next_rule_id),
            organization_id: organization.clone(),
            definition,
            created_at: now,
            updated_at: now,
        };
        state.rules.insert(rule.rule_id, rule.clone());
        Ok(rule)
    }

    fn update_rule(&self, rule: ComplianceRule) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        match state.rules.get(&rule.rule_id) {
            Some(existing) if existing.organization_id == rule.organization_id => {}
            _ => return Err(RepositoryError::NotFound),
        }
        if state.name_taken(&rule.organization_id, rule.name(), Some(rule.rule_id)) {
            return Err(RepositoryError::Conflict);
        }
        state.rules.insert(rule.rule_id, rule);
        Ok(())
    }

    fn fetch_rule(
        &self,
        organization: &OrganizationId,
        rule_id: RuleId,
    ) -> Result<Option<ComplianceRule>, RepositoryError> {
        Ok(self
            .state()?
            .rules
            .get(&rule_id)
            .filter(|rule| &rule.organization_id == organization)
            .cloned())
    }

    fn rules(&self, organization: &OrganizationId) -> Result<Vec<ComplianceRule>, RepositoryError> {
        Ok(self
            .state()?
            .rules
            .values()
            .filter(|rule| &rule.organization_id == organization)
            .cloned()
            .collect())
    }
}

impl BlockerRepository for InMemoryComplianceStore {
    fn open_for_case(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<Vec<Blocker>, RepositoryError> {
        Ok(self
            .history_for_case(organization, case_id)?
            .into_iter()
            .filter(Blocker::is_open)
            .collect())
    }

    fn open_for_organization(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<Blocker>, RepositoryError> {
        Ok(self
            .state()?
            .blockers
            .values()
            .filter(|blocker| blocker.is_open() && &blocker.organization_id == organization)
            .cloned()
            .collect())
    }

    fn history_for_case(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<Vec<Blocker>, RepositoryError> {
        Ok(self
            .state()?
            .blockers
            .values()
            .filter(|blocker| {
                &blocker.organization_id == organization && &blocker.case_id == case_id
            })
            .cloned()
            .collect())
    }

    fn open_counts_by_rule(
        &self,
        organization: &OrganizationId,
    ) -> Result<BTreeMap<RuleId, usize>, RepositoryError> {
        let mut counts = BTreeMap::new();
        for blocker in self.open_for_organization(organization)? {
            *counts.entry(blocker.rule_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn apply(
        &self,
        plan: &ReconciliationPlan,
        now: DateTime<Utc>,
    ) -> Result<ReconciliationOutcome, RepositoryError> {
        let mut state = self.state()?;
        let mut outcome = ReconciliationOutcome::empty(plan.case_id.clone());

        for blocker_id in &plan.resolve {
            if let Some(blocker) = state.blockers.get_mut(blocker_id) {
                if blocker.is_open() && blocker.case_id == plan.case_id {
                    blocker.resolve(now);
                    outcome.resolved.push(blocker.clone());
                }
            }
        }

        for rule_id in &plan.open {
            if state.has_open(&plan.case_id, *rule_id) {
                continue;
            }
            state.next_blocker_id += 1;
            let blocker = Blocker {
                blocker_id: BlockerId(state.next_blocker_id),
                organization_id: plan.organization_id.clone(),
                case_id: plan.case_id.clone(),
                rule_id: *rule_id,
                is_resolved: false,
                created_at: now,
                resolved_at: None,
            };
            state.blockers.insert(blocker.blocker_id, blocker.clone());
            outcome.opened.push(blocker);
        }

        Ok(outcome)
    }
}

/// Process-local case directory standing in for the case-tracking system.
#[derive(Default)]
pub struct InMemoryCaseDirectory {
    cases: Mutex<HashMap<CaseId, CaseRecord>>,
}

impl InMemoryCaseDirectory {
    fn cases(&self) -> Result<MutexGuard<'_, HashMap<CaseId, CaseRecord>>, RepositoryError> {
        self.cases
            .lock()
            .map_err(|_| RepositoryError::Unavailable("case directory mutex poisoned".to_string()))
    }
}

impl CaseDirectory for InMemoryCaseDirectory {
    fn fetch(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<Option<CaseRecord>, RepositoryError> {
        Ok(self
            .cases()?
            .get(case_id)
            .filter(|record| &record.organization_id == organization)
            .cloned())
    }

    fn store(&self, record: CaseRecord) -> Result<(), RepositoryError> {
        let mut cases = self.cases()?;
        if let Some(existing) = cases.get(&record.case_id) {
            if existing.organization_id != record.organization_id {
                return Err(RepositoryError::Conflict);
            }
        }
        cases.insert(record.case_id.clone(), record);
        Ok(())
    }

    fn remove(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<(), RepositoryError> {
        let mut cases = self.cases()?;
        if cases
            .get(case_id)
            .is_some_and(|record| &record.organization_id == organization)
        {
            cases.remove(case_id);
        }
        Ok(())
    }

    fn case_ids(&self, organization: &OrganizationId) -> Result<Vec<CaseId>, RepositoryError> {
        let mut ids: Vec<CaseId> = self
            .cases()?
            .values()
            .filter(|record| &record.organization_id == organization)
            .map(|record| record.case_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
