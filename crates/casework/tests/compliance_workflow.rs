//! End-to-end compliance scenarios driven through the public service facade.
//!
//! Each scenario registers rules and cases, feeds case mutations, and checks
//! the blocker rows the reconciler leaves behind.

mod common {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};

    use casework::workflows::cases::compliance::{
        BlockerRepository, ComplianceService, InMemoryCaseDirectory, InMemoryComplianceStore,
        RuleDraft, RuleRepository,
    };
    use casework::workflows::cases::{CaseId, CaseRecord, CaseStage, OrganizationId};

    pub(super) fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 9, minute, 0)
            .single()
            .expect("valid timestamp")
    }

    pub(super) fn org() -> OrganizationId {
        OrganizationId("org-riverside".to_string())
    }

    pub(super) fn case_id() -> CaseId {
        CaseId("case-100".to_string())
    }

    pub(super) fn case_at(stage: CaseStage) -> CaseRecord {
        CaseRecord::new(case_id(), org(), stage)
    }

    /// Parse a rule exactly as an administrator would submit it.
    pub(super) fn draft(json: serde_json::Value) -> RuleDraft {
        serde_json::from_value(json).expect("rule draft parses")
    }

    pub(super) fn memory_service(
    ) -> ComplianceService<InMemoryComplianceStore, InMemoryCaseDirectory> {
        ComplianceService::new(
            Arc::new(InMemoryComplianceStore::default()),
            Arc::new(InMemoryCaseDirectory::default()),
        )
    }

    pub(super) fn open_rule_names<S, C>(service: &ComplianceService<S, C>) -> Vec<String>
    where
        S: RuleRepository + BlockerRepository + 'static,
        C: casework::workflows::cases::compliance::CaseDirectory + 'static,
    {
        service
            .outstanding_blockers(&org(), &case_id())
            .expect("outstanding blockers")
            .into_iter()
            .map(|view| view.rule_name)
            .collect()
    }
}

mod scenarios {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use serde_json::json;

    use super::common::*;
    use casework::workflows::cases::compliance::{
        BlockerRepository, CaseDirectory, ComplianceService, InMemoryCaseDirectory,
        RuleRepository, SqliteComplianceStore,
    };
    use casework::workflows::cases::{
        CaseDocument, CaseField, CaseMutation, CaseStage, Disposition, DocumentStatus,
        DocumentTag, SignatureRequest, Signer,
    };

    #[test]
    fn missing_document_blocks_until_uploaded() {
        let service = memory_service();
        service
            .create_rule(
                &org(),
                draft(json!({
                    "name": "General price list",
                    "conditionType": "ALWAYS",
                    "requirementType": "DOCUMENT_EXISTS",
                    "requirementTag": "GPL",
                    "severity": "BLOCKER",
                })),
            )
            .expect("rule created");

        let opened = service
            .register_case(case_at(CaseStage::Intake))
            .expect("case registered");
        assert_eq!(opened.opened.len(), 1);
        assert!(service.is_blocked(&org(), &case_id()).expect("status"));

        let outcome = service
            .apply_mutation_at(
                &org(),
                &case_id(),
                CaseMutation::DocumentRecorded {
                    document: CaseDocument {
                        document_id: "doc-gpl".to_string(),
                        tag: DocumentTag::new("GPL"),
                        status: DocumentStatus::Uploaded,
                        created_at: at(5),
                    },
                },
                at(6),
            )
            .expect("document recorded");

        assert_eq!(outcome.resolved.len(), 1);
        assert!(outcome.opened.is_empty());
        assert!(open_rule_names(&service).is_empty());
        assert!(!service.is_blocked(&org(), &case_id()).expect("status"));
    }

    #[test]
    fn cremation_authorization_applies_only_to_cremations() {
        let service = memory_service();
        service
            .create_rule(
                &org(),
                draft(json!({
                    "name": "Cremation authorization",
                    "conditionType": "DISPOSITION_EQUALS",
                    "conditionValue": "CREMATION",
                    "requirementType": "SIGNATURE_COMPLETED",
                    "requirementTag": "AUTHORIZATION_CREMATION",
                    "severity": "BLOCKER",
                })),
            )
            .expect("rule created");

        let mut record = case_at(CaseStage::Arrangement);
        record.disposition = Some(Disposition::Burial);
        service.register_case(record).expect("case registered");

        let requested = service
            .apply_mutation_at(
                &org(),
                &case_id(),
                CaseMutation::SignatureRequested {
                    request: SignatureRequest {
                        request_id: "sig-1".to_string(),
                        tag: DocumentTag::new("AUTHORIZATION_CREMATION"),
                        signers: vec![Signer {
                            name: "Dana Whitfield".to_string(),
                            completed_at: None,
                        }],
                        requested_at: at(2),
                    },
                },
                at(2),
            )
            .expect("signature requested");
        assert!(requested.is_empty(), "burial cases never need the authorization");
        assert!(open_rule_names(&service).is_empty());

        let changed = service
            .apply_mutation_at(
                &org(),
                &case_id(),
                CaseMutation::DispositionChanged {
                    disposition: Some(Disposition::Cremation),
                },
                at(3),
            )
            .expect("disposition changed");
        assert_eq!(changed.opened.len(), 1);
        assert_eq!(open_rule_names(&service), vec!["Cremation authorization"]);

        let signed = service
            .apply_mutation_at(
                &org(),
                &case_id(),
                CaseMutation::SignerCompleted {
                    request_id: "sig-1".to_string(),
                    signer: "dana whitfield".to_string(),
                    completed_at: at(4),
                },
                at(4),
            )
            .expect("signer completed");
        assert_eq!(signed.resolved.len(), 1);
    }

    #[test]
    fn date_of_death_required_once_arrangements_begin() {
        let service = memory_service();
        service
            .create_rule(
                &org(),
                draft(json!({
                    "name": "Date of death recorded",
                    "conditionType": "STAGE_GTE",
                    "conditionValue": "ARRANGEMENT",
                    "requirementType": "FIELD_COMPLETED",
                    "requirementField": "decedent.dateOfDeath",
                })),
            )
            .expect("rule created");

        let registered = service
            .register_case(case_at(CaseStage::Intake))
            .expect("case registered");
        assert!(registered.is_empty());

        let advanced = service
            .apply_mutation_at(
                &org(),
                &case_id(),
                CaseMutation::StageChanged {
                    stage: CaseStage::Arrangement,
                },
                at(1),
            )
            .expect("stage advanced");
        assert_eq!(advanced.opened.len(), 1);

        let filled = service
            .apply_mutation_at(
                &org(),
                &case_id(),
                CaseMutation::FieldEdited {
                    field: CaseField::DecedentDateOfDeath,
                    value: "2025-09-28".to_string(),
                },
                at(2),
            )
            .expect("field filled");
        assert_eq!(filled.resolved.len(), 1);
        assert!(filled.opened.is_empty());
    }

    #[test]
    fn deactivating_a_rule_clears_its_blockers() {
        let service = memory_service();
        let rule = service
            .create_rule(
                &org(),
                draft(json!({
                    "name": "General price list",
                    "conditionType": "ALWAYS",
                    "requirementType": "DOCUMENT_EXISTS",
                    "requirementTag": "GPL",
                })),
            )
            .expect("rule created");
        service
            .register_case(case_at(CaseStage::Intake))
            .expect("case registered");
        assert_eq!(open_rule_names(&service).len(), 1);

        service
            .set_rule_active(&org(), rule.rule_id, false)
            .expect("rule deactivated");
        let outcome = service
            .reconcile(&org(), &case_id())
            .expect("reconciled");

        assert_eq!(outcome.resolved.len(), 1);
        assert!(open_rule_names(&service).is_empty());
        let history = service
            .blocker_history(&org(), &case_id())
            .expect("history");
        assert_eq!(history.len(), 1);
        assert!(history[0].is_resolved);
    }

    fn simultaneous_triggers_open_one_blocker<S>(store: Arc<S>)
    where
        S: RuleRepository + BlockerRepository + 'static,
    {
        let cases = Arc::new(InMemoryCaseDirectory::default());
        cases
            .store(case_at(CaseStage::Intake))
            .expect("case stored");
        let service = ComplianceService::new(store.clone(), cases);
        service
            .create_rule(
                &org(),
                draft(json!({
                    "name": "General price list",
                    "conditionType": "ALWAYS",
                    "requirementType": "DOCUMENT_EXISTS",
                    "requirementTag": "GPL",
                })),
            )
            .expect("rule created");

        let triggers = 2;
        let barrier = Barrier::new(triggers);
        let opened: usize = thread::scope(|scope| {
            let workers: Vec<_> = (0..triggers)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        service
                            .reconcile_at(&org(), &case_id(), at(1))
                            .expect("reconciled")
                            .opened
                            .len()
                    })
                })
                .collect();
            workers
                .into_iter()
                .map(|worker| worker.join().expect("worker finished"))
                .sum()
        });

        assert_eq!(opened, 1);
        assert_eq!(
            store
                .history_for_case(&org(), &case_id())
                .expect("history")
                .len(),
            1
        );
    }

    #[test]
    fn simultaneous_triggers_open_one_blocker_in_memory() {
        simultaneous_triggers_open_one_blocker(Arc::new(
            casework::workflows::cases::compliance::InMemoryComplianceStore::default(),
        ));
    }

    #[test]
    fn simultaneous_triggers_open_one_blocker_in_sqlite() {
        simultaneous_triggers_open_one_blocker(Arc::new(
            SqliteComplianceStore::open_in_memory().expect("sqlite store"),
        ));
    }
}
