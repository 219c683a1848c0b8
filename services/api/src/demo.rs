use casework::error::AppError;
use casework::workflows::cases::compliance::{
    ComplianceService, ConditionKind, InMemoryCaseDirectory, InMemoryComplianceStore,
    ReconciliationOutcome, RequirementKind, RuleDraft, Severity,
};
use casework::workflows::cases::{
    CaseDocument, CaseField, CaseId, CaseMutation, CaseRecord, CaseStage, Disposition,
    DocumentStatus, DocumentTag, OrganizationId, SignatureRequest, Signer,
};
use chrono::Utc;
use clap::Args;
use std::sync::Arc;

type DemoService = ComplianceService<InMemoryComplianceStore, InMemoryCaseDirectory>;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Organization the sample rules and cases belong to
    #[arg(long, default_value = "org-demo")]
    pub(crate) organization: String,
    /// Print the final blocker history for each case as JSON
    #[arg(long)]
    pub(crate) history: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let organization = OrganizationId(args.organization);
    let service: DemoService = ComplianceService::new(
        Arc::new(InMemoryComplianceStore::default()),
        Arc::new(InMemoryCaseDirectory::default()),
    );

    println!("Case compliance demo for {}", organization);
    for draft in demo_rules() {
        let rule = service.create_rule(&organization, draft)?;
        println!(
            "  Rule {} [{}] {}",
            rule.rule_id,
            rule.severity().label(),
            rule.name()
        );
    }

    let case_ids = [
        document_walkthrough(&service, &organization)?,
        cremation_walkthrough(&service, &organization)?,
        field_walkthrough(&service, &organization)?,
    ];

    println!("\nOutstanding blockers");
    for case_id in &case_ids {
        let status = service.case_status(&organization, case_id)?;
        println!(
            "  {}: {} ({} blocking, {} warnings)",
            case_id,
            if status.blocked { "blocked" } else { "clear" },
            status.blocker_count,
            status.warning_count
        );
        for view in &status.outstanding {
            println!("    - [{}] {}", view.severity.label(), view.rule_name);
        }
    }

    if args.history {
        for case_id in &case_ids {
            let history = service.blocker_history(&organization, case_id)?;
            match serde_json::to_string_pretty(&history) {
                Ok(json) => println!("\nBlocker history for {}:\n{}", case_id, json),
                Err(err) => println!("\nBlocker history for {} unavailable: {}", case_id, err),
            }
        }
    }

    Ok(())
}

fn demo_rules() -> Vec<RuleDraft> {
    let mut gpl = blank_draft(
        "General price list on file",
        ConditionKind::Always,
        RequirementKind::DocumentExists,
    );
    gpl.requirement_tag = Some("GPL".to_string());

    let mut cremation = blank_draft(
        "Cremation authorization signed",
        ConditionKind::DispositionEquals,
        RequirementKind::SignatureCompleted,
    );
    cremation.condition_value = Some("CREMATION".to_string());
    cremation.requirement_tag = Some("AUTHORIZATION_CREMATION".to_string());

    let mut death_date = blank_draft(
        "Date of death recorded",
        ConditionKind::StageGte,
        RequirementKind::FieldCompleted,
    );
    death_date.condition_value = Some("ARRANGEMENT".to_string());
    death_date.requirement_field = Some(CaseField::DecedentDateOfDeath.key());

    let mut obituary = blank_draft(
        "Obituary drafted",
        ConditionKind::StageGte,
        RequirementKind::DocumentExists,
    );
    obituary.condition_value = Some("SERVICE".to_string());
    obituary.requirement_tag = Some("OBITUARY".to_string());
    obituary.severity = Severity::Warning;

    vec![gpl, cremation, death_date, obituary]
}

fn blank_draft(name: &str, condition: ConditionKind, requirement: RequirementKind) -> RuleDraft {
    RuleDraft {
        name: name.to_string(),
        description: None,
        condition_type: condition,
        condition_field: None,
        condition_value: None,
        requirement_type: requirement,
        requirement_tag: None,
        requirement_field: None,
        requires_signed: true,
        severity: Severity::Blocker,
        is_active: true,
    }
}

fn document_walkthrough(
    service: &DemoService,
    organization: &OrganizationId,
) -> Result<CaseId, AppError> {
    let case_id = CaseId("case-gpl".to_string());
    println!("\nMissing price list ({})", case_id);

    let mut record = CaseRecord::new(case_id.clone(), organization.clone(), CaseStage::Intake);
    record.disposition = Some(Disposition::Burial);
    record.decedent.date_of_death = chrono::NaiveDate::from_ymd_opt(2025, 9, 28);
    report("case opened", &service.register_case(record)?);

    let mutation = CaseMutation::DocumentRecorded {
        document: CaseDocument {
            document_id: "doc-gpl-1".to_string(),
            tag: DocumentTag::new("GPL"),
            status: DocumentStatus::Uploaded,
            created_at: Utc::now(),
        },
    };
    report(
        "GPL uploaded",
        &service.apply_mutation(organization, &case_id, mutation)?,
    );
    Ok(case_id)
}

fn cremation_walkthrough(
    service: &DemoService,
    organization: &OrganizationId,
) -> Result<CaseId, AppError> {
    let case_id = CaseId("case-cremation".to_string());
    println!("\nDisposition change ({})", case_id);

    let mut record = CaseRecord::new(case_id.clone(), organization.clone(), CaseStage::Intake);
    record.disposition = Some(Disposition::Burial);
    record.documents.push(CaseDocument {
        document_id: "doc-gpl-2".to_string(),
        tag: DocumentTag::new("GPL"),
        status: DocumentStatus::Generated,
        created_at: Utc::now(),
    });
    record.decedent.date_of_death = chrono::NaiveDate::from_ymd_opt(2025, 9, 30);
    report("burial case opened", &service.register_case(record)?);

    let request = CaseMutation::SignatureRequested {
        request: SignatureRequest {
            request_id: "sig-cremation".to_string(),
            tag: DocumentTag::new("AUTHORIZATION_CREMATION"),
            signers: vec![Signer {
                name: "Next of kin".to_string(),
                completed_at: None,
            }],
            requested_at: Utc::now(),
        },
    };
    report(
        "authorization sent (rule not applicable)",
        &service.apply_mutation(organization, &case_id, request)?,
    );

    let switch = CaseMutation::DispositionChanged {
        disposition: Some(Disposition::Cremation),
    };
    report(
        "disposition changed to cremation",
        &service.apply_mutation(organization, &case_id, switch)?,
    );
    Ok(case_id)
}

fn field_walkthrough(
    service: &DemoService,
    organization: &OrganizationId,
) -> Result<CaseId, AppError> {
    let case_id = CaseId("case-arrangement".to_string());
    println!("\nStage-gated field ({})", case_id);

    let mut record = CaseRecord::new(case_id.clone(), organization.clone(), CaseStage::Intake);
    record.documents.push(CaseDocument {
        document_id: "doc-gpl-3".to_string(),
        tag: DocumentTag::new("GPL"),
        status: DocumentStatus::Uploaded,
        created_at: Utc::now(),
    });
    report("intake case opened", &service.register_case(record)?);

    let advance = CaseMutation::StageChanged {
        stage: CaseStage::Arrangement,
    };
    report(
        "advanced to arrangement",
        &service.apply_mutation(organization, &case_id, advance)?,
    );

    let fill = CaseMutation::FieldEdited {
        field: CaseField::DecedentDateOfDeath,
        value: "2025-10-01".to_string(),
    };
    report(
        "date of death entered",
        &service.apply_mutation(organization, &case_id, fill)?,
    );

    let record = service.case(organization, &case_id)?;
    println!("  Stage unchanged: {}", record.stage.code());
    Ok(case_id)
}

fn report(step: &str, outcome: &ReconciliationOutcome) {
    if outcome.is_empty() {
        println!("  {}: no change", step);
        return;
    }
    println!(
        "  {}: opened {}, resolved {}",
        step,
        outcome.opened.len(),
        outcome.resolved.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_rules_are_valid() {
        for draft in demo_rules() {
            let name = draft.name.clone();
            assert!(draft.into_definition().is_ok(), "{name} should validate");
        }
    }

    #[test]
    fn walkthroughs_leave_only_the_cremation_case_blocked() {
        let organization = OrganizationId("org-demo".to_string());
        let service: DemoService = ComplianceService::new(
            Arc::new(InMemoryComplianceStore::default()),
            Arc::new(InMemoryCaseDirectory::default()),
        );
        for draft in demo_rules() {
            service.create_rule(&organization, draft).expect("rule");
        }

        let gpl = document_walkthrough(&service, &organization).expect("gpl");
        let cremation = cremation_walkthrough(&service, &organization).expect("cremation");
        let field = field_walkthrough(&service, &organization).expect("field");

        assert!(!service.is_blocked(&organization, &gpl).expect("status"));
        assert!(service.is_blocked(&organization, &cremation).expect("status"));
        assert!(!service.is_blocked(&organization, &field).expect("status"));
    }
}
