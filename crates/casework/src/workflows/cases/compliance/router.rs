use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::super::domain::{CaseId, CaseMutation, CaseRecord, OrganizationId};
use super::repository::{BlockerRepository, CaseDirectory, RepositoryError, RuleRepository};
use super::rules::{RuleDraft, RuleId};
use super::service::{ComplianceError, ComplianceService};

type SharedService<S, C> = Arc<ComplianceService<S, C>>;

/// Router exposing rule management, case triggers, and blocker queries.
pub fn compliance_router<S, C>(service: SharedService<S, C>) -> Router
where
    S: RuleRepository + BlockerRepository + 'static,
    C: CaseDirectory + 'static,
{
    Router::new()
        .route(
            "/api/v1/organizations/:organization/rules",
            post(create_rule_handler::<S, C>).get(list_rules_handler::<S, C>),
        )
        .route(
            "/api/v1/organizations/:organization/rules/:rule_id",
            put(update_rule_handler::<S, C>),
        )
        .route(
            "/api/v1/organizations/:organization/rules/:rule_id/activation",
            post(activation_handler::<S, C>),
        )
        .route(
            "/api/v1/organizations/:organization/blockers",
            get(organization_blockers_handler::<S, C>),
        )
        .route(
            "/api/v1/organizations/:organization/reconcile",
            post(reconcile_organization_handler::<S, C>),
        )
        .route(
            "/api/v1/organizations/:organization/cases/:case_id",
            put(register_case_handler::<S, C>).get(case_handler::<S, C>),
        )
        .route(
            "/api/v1/organizations/:organization/cases/:case_id/blockers",
            get(case_status_handler::<S, C>),
        )
        .route(
            "/api/v1/organizations/:organization/cases/:case_id/blockers/history",
            get(blocker_history_handler::<S, C>),
        )
        .route(
            "/api/v1/organizations/:organization/cases/:case_id/reconcile",
            post(reconcile_case_handler::<S, C>),
        )
        .route(
            "/api/v1/organizations/:organization/cases/:case_id/mutations",
            post(mutation_handler::<S, C>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActivationRequest {
    pub active: bool,
}

pub(crate) async fn create_rule_handler<S, C>(
    State(service): State<SharedService<S, C>>,
    Path(organization): Path<String>,
    Json(draft): Json<RuleDraft>,
) -> Response
where
    S: RuleRepository + BlockerRepository + 'static,
    C: CaseDirectory + 'static,
{
    match service.create_rule(&OrganizationId(organization), draft) {
        Ok(rule) => (StatusCode::CREATED, Json(rule)).into_response(),
        Err(ComplianceError::Repository(RepositoryError::Conflict)) => {
            let payload = json!({
                "error": "a rule with this name already exists",
            });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        Err(other) => other.into_response(),
    }
}

pub(crate) async fn list_rules_handler<S, C>(
    State(service): State<SharedService<S, C>>,
    Path(organization): Path<String>,
) -> Response
where
    S: RuleRepository + BlockerRepository + 'static,
    C: CaseDirectory + 'static,
{
    match service.list_rules(&OrganizationId(organization)) {
        Ok(rules) => (StatusCode::OK, Json(rules)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn update_rule_handler<S, C>(
    State(service): State<SharedService<S, C>>,
    Path((organization, rule_id)): Path<(String, u64)>,
    Json(draft): Json<RuleDraft>,
) -> Response
where
    S: RuleRepository + BlockerRepository + 'static,
    C: CaseDirectory + 'static,
{
    match service.update_rule(&OrganizationId(organization), RuleId(rule_id), draft) {
        Ok(rule) => (StatusCode::OK, Json(rule)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn activation_handler<S, C>(
    State(service): State<SharedService<S, C>>,
    Path((organization, rule_id)): Path<(String, u64)>,
    Json(request): Json<ActivationRequest>,
) -> Response
where
    S: RuleRepository + BlockerRepository + 'static,
    C: CaseDirectory + 'static,
{
    match service.set_rule_active(&OrganizationId(organization), RuleId(rule_id), request.active)
    {
        Ok(rule) => (StatusCode::OK, Json(rule)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn organization_blockers_handler<S, C>(
    State(service): State<SharedService<S, C>>,
    Path(organization): Path<String>,
) -> Response
where
    S: RuleRepository + BlockerRepository + 'static,
    C: CaseDirectory + 'static,
{
    match service.organization_blockers(&OrganizationId(organization)) {
        Ok(views) => (StatusCode::OK, Json(views)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn reconcile_organization_handler<S, C>(
    State(service): State<SharedService<S, C>>,
    Path(organization): Path<String>,
) -> Response
where
    S: RuleRepository + BlockerRepository + 'static,
    C: CaseDirectory + 'static,
{
    match service.reconcile_organization(&OrganizationId(organization)) {
        Ok(outcomes) => (StatusCode::OK, Json(outcomes)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// The path decides which case and organization the record belongs to.
pub(crate) async fn register_case_handler<S, C>(
    State(service): State<SharedService<S, C>>,
    Path((organization, case_id)): Path<(String, String)>,
    Json(mut record): Json<CaseRecord>,
) -> Response
where
    S: RuleRepository + BlockerRepository + 'static,
    C: CaseDirectory + 'static,
{
    record.organization_id = OrganizationId(organization);
    record.case_id = CaseId(case_id);
    match service.register_case(record) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(ComplianceError::Repository(RepositoryError::Conflict)) => {
            let payload = json!({
                "error": "case belongs to another organization",
            });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        Err(other) => other.into_response(),
    }
}

pub(crate) async fn case_handler<S, C>(
    State(service): State<SharedService<S, C>>,
    Path((organization, case_id)): Path<(String, String)>,
) -> Response
where
    S: RuleRepository + BlockerRepository + 'static,
    C: CaseDirectory + 'static,
{
    match service.case(&OrganizationId(organization), &CaseId(case_id)) {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn case_status_handler<S, C>(
    State(service): State<SharedService<S, C>>,
    Path((organization, case_id)): Path<(String, String)>,
) -> Response
where
    S: RuleRepository + BlockerRepository + 'static,
    C: CaseDirectory + 'static,
{
    match service.case_status(&OrganizationId(organization), &CaseId(case_id)) {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn blocker_history_handler<S, C>(
    State(service): State<SharedService<S, C>>,
    Path((organization, case_id)): Path<(String, String)>,
) -> Response
where
    S: RuleRepository + BlockerRepository + 'static,
    C: CaseDirectory + 'static,
{
    match service.blocker_history(&OrganizationId(organization), &CaseId(case_id)) {
        Ok(history) => (StatusCode::OK, Json(history)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn reconcile_case_handler<S, C>(
    State(service): State<SharedService<S, C>>,
    Path((organization, case_id)): Path<(String, String)>,
) -> Response
where
    S: RuleRepository + BlockerRepository + 'static,
    C: CaseDirectory + 'static,
{
    match service.reconcile(&OrganizationId(organization), &CaseId(case_id)) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn mutation_handler<S, C>(
    State(service): State<SharedService<S, C>>,
    Path((organization, case_id)): Path<(String, String)>,
    Json(mutation): Json<CaseMutation>,
) -> Response
where
    S: RuleRepository + BlockerRepository + 'static,
    C: CaseDirectory + 'static,
{
    match service.apply_mutation(&OrganizationId(organization), &CaseId(case_id), mutation) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(err) => err.into_response(),
    }
}

impl ComplianceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ComplianceError::Validation(_) | ComplianceError::InvalidMutation(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ComplianceError::CaseNotFound(_)
            | ComplianceError::RuleNotFound(_)
            | ComplianceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            ComplianceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            ComplianceError::Repository(RepositoryError::Unavailable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ComplianceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let payload = json!({
            "error": self.to_string(),
        });
        (status, Json(payload)).into_response()
    }
}
