//! Pure rule evaluation against a [`CaseSnapshot`].
//!
//! Both predicates are total: they never fail and depend only on the rule and
//! the snapshot.

mod conditions;
mod requirements;

pub use conditions::applies;
pub use requirements::satisfied;

use serde::Serialize;

use super::super::snapshot::CaseSnapshot;
use super::rules::ComplianceRule;

/// Outcome of checking one rule against one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleVerdict {
    Inactive,
    Inapplicable,
    Satisfied,
    Violated,
}

impl RuleVerdict {
    pub const fn is_violation(self) -> bool {
        matches!(self, Self::Violated)
    }
}

pub fn evaluate(rule: &ComplianceRule, snapshot: &CaseSnapshot) -> RuleVerdict {
    if !rule.is_active() {
        return RuleVerdict::Inactive;
    }
    if !applies(&rule.definition.condition, snapshot) {
        return RuleVerdict::Inapplicable;
    }
    if satisfied(&rule.definition.requirement, snapshot) {
        RuleVerdict::Satisfied
    } else {
        RuleVerdict::Violated
    }
}

/// Split rules into those currently violated and those that are clear.
pub fn partition<'a>(
    rules: &'a [ComplianceRule],
    snapshot: &CaseSnapshot,
) -> (Vec<&'a ComplianceRule>, Vec<&'a ComplianceRule>) {
    rules
        .iter()
        .partition(|rule| evaluate(rule, snapshot).is_violation())
}
