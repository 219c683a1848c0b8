use std::collections::BTreeMap;
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::cases::compliance::blockers::{
    Blocker, ReconciliationOutcome, ReconciliationPlan,
};
use crate::workflows::cases::compliance::memory::{InMemoryCaseDirectory, InMemoryComplianceStore};
use crate::workflows::cases::compliance::repository::{
    BlockerRepository, CaseDirectory, RepositoryError, RuleRepository,
};
use crate::workflows::cases::compliance::rules::{
    ComplianceRule, ConditionKind, RequirementKind, RuleCondition, RuleDefinition, RuleDraft,
    RuleId, RuleRequirement, Severity,
};
use crate::workflows::cases::compliance::service::ComplianceService;
use crate::workflows::cases::domain::{
    CaseDocument, CaseId, CaseRecord, CaseStage, DocumentStatus, DocumentTag, OrganizationId,
    SignatureRequest, Signer,
};
use crate::workflows::cases::snapshot::CaseSnapshot;

pub(super) type MemoryService = ComplianceService<InMemoryComplianceStore, InMemoryCaseDirectory>;

pub(super) fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 1, 9, minute, 0).unwrap()
}

pub(super) fn org() -> OrganizationId {
    OrganizationId("org-riverside".to_string())
}

pub(super) fn other_org() -> OrganizationId {
    OrganizationId("org-lakeview".to_string())
}

pub(super) fn case_id(raw: &str) -> CaseId {
    CaseId(raw.to_string())
}

pub(super) fn case(raw: &str, stage: CaseStage) -> CaseRecord {
    CaseRecord::new(case_id(raw), org(), stage)
}

pub(super) fn document(id: &str, tag: &str, status: DocumentStatus, minute: u32) -> CaseDocument {
    CaseDocument {
        document_id: id.to_string(),
        tag: DocumentTag::new(tag),
        status,
        created_at: at(minute),
    }
}

/// Signature request whose signers are `(name, completed)` pairs.
pub(super) fn signature_request(
    id: &str,
    tag: &str,
    signers: &[(&str, bool)],
    minute: u32,
) -> SignatureRequest {
    SignatureRequest {
        request_id: id.to_string(),
        tag: DocumentTag::new(tag),
        signers: signers
            .iter()
            .map(|(name, completed)| Signer {
                name: name.to_string(),
                completed_at: completed.then(|| at(minute)),
            })
            .collect(),
        requested_at: at(minute),
    }
}

pub(super) fn snapshot(record: &CaseRecord) -> CaseSnapshot {
    CaseSnapshot::from_record(record)
}

/// Stored rule built directly from its tagged-union parts.
pub(super) fn rule(
    id: u64,
    condition: RuleCondition,
    requirement: RuleRequirement,
    severity: Severity,
) -> ComplianceRule {
    ComplianceRule {
        rule_id: RuleId(id),
        organization_id: org(),
        definition: RuleDefinition {
            name: format!("rule {id}"),
            description: None,
            condition,
            requirement,
            severity,
            is_active: true,
        },
        created_at: at(0),
        updated_at: at(0),
    }
}

pub(super) fn draft(
    name: &str,
    condition_type: ConditionKind,
    requirement_type: RequirementKind,
) -> RuleDraft {
    RuleDraft {
        name: name.to_string(),
        description: None,
        condition_type,
        condition_field: None,
        condition_value: None,
        requirement_type,
        requirement_tag: None,
        requirement_field: None,
        requires_signed: true,
        severity: Severity::Blocker,
        is_active: true,
    }
}

/// `ALWAYS` / `DOCUMENT_EXISTS` for `tag`.
pub(super) fn document_draft(name: &str, tag: &str, severity: Severity) -> RuleDraft {
    let mut built = draft(name, ConditionKind::Always, RequirementKind::DocumentExists);
    built.requirement_tag = Some(tag.to_string());
    built.severity = severity;
    built
}

pub(super) fn build_service() -> (
    MemoryService,
    Arc<InMemoryComplianceStore>,
    Arc<InMemoryCaseDirectory>,
) {
    let store = Arc::new(InMemoryComplianceStore::default());
    let cases = Arc::new(InMemoryCaseDirectory::default());
    let service = ComplianceService::new(store.clone(), cases.clone());
    (service, store, cases)
}

/// Rule and blocker reads succeed but every blocker write fails.
#[derive(Default)]
pub(super) struct FailingBlockerStore {
    inner: InMemoryComplianceStore,
}

impl RuleRepository for FailingBlockerStore {
    fn insert_rule(
        &self,
        organization: &OrganizationId,
        definition: RuleDefinition,
        now: DateTime<Utc>,
    ) -> Result<ComplianceRule, RepositoryError> {
        self.inner.insert_rule(organization, definition, now)
    }

    fn update_rule(&self, rule: ComplianceRule) -> Result<(), RepositoryError> {
        self.inner.update_rule(rule)
    }

    fn fetch_rule(
        &self,
        organization: &OrganizationId,
        rule_id: RuleId,
    ) -> Result<Option<ComplianceRule>, RepositoryError> {
        self.inner.fetch_rule(organization, rule_id)
    }

    fn rules(&self, organization: &OrganizationId) -> Result<Vec<ComplianceRule>, RepositoryError> {
        self.inner.rules(organization)
    }
}

impl BlockerRepository for FailingBlockerStore {
    fn open_for_case(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<Vec<Blocker>, RepositoryError> {
        self.inner.open_for_case(organization, case_id)
    }

    fn open_for_organization(
        &self,
        organization: &OrganizationId,
    ) -> Result<Vec<Blocker>, RepositoryError> {
        self.inner.open_for_organization(organization)
    }

    fn history_for_case(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<Vec<Blocker>, RepositoryError> {
        self.inner.history_for_case(organization, case_id)
    }

    fn open_counts_by_rule(
        &self,
        organization: &OrganizationId,
    ) -> Result<BTreeMap<RuleId, usize>, RepositoryError> {
        self.inner.open_counts_by_rule(organization)
    }

    fn apply(
        &self,
        _plan: &ReconciliationPlan,
        _now: DateTime<Utc>,
    ) -> Result<ReconciliationOutcome, RepositoryError> {
        Err(RepositoryError::Unavailable("blocker table locked".to_string()))
    }
}

pub(super) struct UnavailableStore;

impl RuleRepository for UnavailableStore {
    fn insert_rule(
        &self,
        _organization: &OrganizationId,
        _definition: RuleDefinition,
        _now: DateTime<Utc>,
    ) -> Result<ComplianceRule, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update_rule(&self, _rule: ComplianceRule) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch_rule(
        &self,
        _organization: &OrganizationId,
        _rule_id: RuleId,
    ) -> Result<Option<ComplianceRule>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn rules(
        &self,
        _organization: &OrganizationId,
    ) -> Result<Vec<ComplianceRule>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

impl BlockerRepository for UnavailableStore {
    fn open_for_case(
        &self,
        _organization: &OrganizationId,
        _case_id: &CaseId,
    ) -> Result<Vec<Blocker>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn open_for_organization(
        &self,
        _organization: &OrganizationId,
    ) -> Result<Vec<Blocker>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn history_for_case(
        &self,
        _organization: &OrganizationId,
        _case_id: &CaseId,
    ) -> Result<Vec<Blocker>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn open_counts_by_rule(
        &self,
        _organization: &OrganizationId,
    ) -> Result<BTreeMap<RuleId, usize>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn apply(
        &self,
        _plan: &ReconciliationPlan,
        _now: DateTime<Utc>,
    ) -> Result<ReconciliationOutcome, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) fn register(cases: &InMemoryCaseDirectory, record: CaseRecord) {
    cases.store(record).expect("case stored");
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
