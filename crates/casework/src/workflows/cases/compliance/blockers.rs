use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{CaseId, OrganizationId};
use super::super::snapshot::CaseSnapshot;
use super::evaluation;
use super::rules::{ComplianceRule, RuleId, Severity};

/// Identifier wrapper for persisted blockers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockerId(pub u64);

impl fmt::Display for BlockerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blk-{:06}", self.0)
    }
}

/// Record that a rule was applicable and unsatisfied for a case.
///
/// Rows are never deleted or reopened; a repeat violation gets a new row.
/// `resolved_at` is set exactly when `is_resolved` is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocker {
    pub blocker_id: BlockerId,
    pub organization_id: OrganizationId,
    pub case_id: CaseId,
    pub rule_id: RuleId,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Blocker {
    pub fn is_open(&self) -> bool {
        !self.is_resolved
    }

    /// `Open -> Resolved` is the only transition; resolving twice keeps the first timestamp.
    pub fn resolve(&mut self, now: DateTime<Utc>) {
        if self.is_open() {
            self.is_resolved = true;
            self.resolved_at = Some(now);
        }
    }
}

/// Delta a reconciliation pass wants to write for one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    pub organization_id: OrganizationId,
    pub case_id: CaseId,
    pub open: Vec<RuleId>,
    pub resolve: Vec<BlockerId>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.open.is_empty() && self.resolve.is_empty()
    }
}

/// Rows actually changed by a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub case_id: CaseId,
    pub opened: Vec<Blocker>,
    pub resolved: Vec<Blocker>,
}

impl ReconciliationOutcome {
    pub fn empty(case_id: CaseId) -> Self {
        Self {
            case_id,
            opened: Vec::new(),
            resolved: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.opened.is_empty() && self.resolved.is_empty()
    }
}

/// Diff the blockers that should exist against those currently open.
///
/// `rules` may include inactive rules; only active, applicable, unsatisfied
/// rules produce blockers. Open blockers for any other rule (including ones
/// missing from `rules` entirely) are resolved.
pub fn plan_reconciliation(
    snapshot: &CaseSnapshot,
    rules: &[ComplianceRule],
    open: &[Blocker],
) -> ReconciliationPlan {
    let (violating, _clear) = evaluation::partition(rules, snapshot);
    let violating: BTreeSet<RuleId> = violating.iter().map(|rule| rule.rule_id).collect();

    let already_open: BTreeSet<RuleId> = open
        .iter()
        .filter(|blocker| blocker.is_open())
        .map(|blocker| blocker.rule_id)
        .collect();

    let to_open = violating.difference(&already_open).copied().collect();
    let to_resolve = open
        .iter()
        .filter(|blocker| blocker.is_open() && !violating.contains(&blocker.rule_id))
        .map(|blocker| blocker.blocker_id)
        .collect();

    ReconciliationPlan {
        organization_id: snapshot.organization_id().clone(),
        case_id: snapshot.case_id().clone(),
        open: to_open,
        resolve: to_resolve,
    }
}

/// Open blocker joined with the current state of its rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockerView {
    pub blocker_id: BlockerId,
    pub case_id: CaseId,
    pub rule_id: RuleId,
    pub rule_name: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

impl BlockerView {
    /// Views for open blockers, most severe first, then oldest first.
    pub fn outstanding(blockers: &[Blocker], rules: &[ComplianceRule]) -> Vec<Self> {
        let by_id: BTreeMap<RuleId, &ComplianceRule> =
            rules.iter().map(|rule| (rule.rule_id, rule)).collect();

        let mut views: Vec<Self> = blockers
            .iter()
            .filter(|blocker| blocker.is_open())
            .filter_map(|blocker| {
                let rule = by_id.get(&blocker.rule_id)?;
                Some(Self {
                    blocker_id: blocker.blocker_id,
                    case_id: blocker.case_id.clone(),
                    rule_id: blocker.rule_id,
                    rule_name: rule.name().to_string(),
                    severity: rule.severity(),
                    created_at: blocker.created_at,
                })
            })
            .collect();

        views.sort_by(|left, right| {
            right
                .severity
                .cmp(&left.severity)
                .then(left.created_at.cmp(&right.created_at))
                .then(left.blocker_id.cmp(&right.blocker_id))
        });
        views
    }
}

/// Outstanding obligations for one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseComplianceStatus {
    pub case_id: CaseId,
    /// Only `BLOCKER` severity gates progression.
    pub blocked: bool,
    pub blocker_count: usize,
    pub warning_count: usize,
    pub outstanding: Vec<BlockerView>,
}

impl CaseComplianceStatus {
    pub fn from_views(case_id: CaseId, outstanding: Vec<BlockerView>) -> Self {
        let blocker_count = outstanding
            .iter()
            .filter(|view| view.severity.gates_progression())
            .count();
        Self {
            case_id,
            blocked: blocker_count > 0,
            blocker_count,
            warning_count: outstanding.len() - blocker_count,
            outstanding,
        }
    }
}
