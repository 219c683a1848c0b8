//! Compliance rules and the blockers they raise against cases.

pub mod blockers;
pub mod catalog;
pub mod evaluation;
pub mod memory;
pub mod reconciler;
pub mod repository;
pub mod router;
pub mod rules;
pub mod service;
pub mod sqlite;

#[cfg(test)]
mod tests;

pub use blockers::{
    plan_reconciliation, Blocker, BlockerId, BlockerView, CaseComplianceStatus,
    ReconciliationOutcome, ReconciliationPlan,
};
pub use catalog::{CatalogError, RuleCatalog};
pub use evaluation::RuleVerdict;
pub use memory::{InMemoryCaseDirectory, InMemoryComplianceStore};
pub use reconciler::{BlockerReconciler, ReconcileError};
pub use repository::{BlockerRepository, CaseDirectory, RepositoryError, RuleRepository};
pub use router::compliance_router;
pub use rules::{
    ComplianceRule, ConditionKind, RequirementKind, RuleCondition, RuleDefinition, RuleDraft,
    RuleId, RuleRequirement, RuleValidationError, Severity,
};
pub use service::{ComplianceError, ComplianceService, RuleSummary};
pub use sqlite::SqliteComplianceStore;
