use casework::error::AppError;
use casework::workflows::cases::compliance::{
    ComplianceError, RuleDefinition, RuleDraft, RuleValidationError,
};
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct ValidateRulesArgs {
    /// JSON file holding an array of rule drafts
    pub(crate) path: PathBuf,
}

#[derive(Debug)]
pub(crate) struct DraftCheck {
    pub(crate) position: usize,
    pub(crate) name: String,
    pub(crate) result: Result<RuleDefinition, RuleValidationError>,
}

/// Validate every draft in `raw`, keeping going past invalid entries.
pub(crate) fn check_drafts(raw: &str) -> Result<Vec<DraftCheck>, serde_json::Error> {
    let drafts: Vec<RuleDraft> = serde_json::from_str(raw)?;
    Ok(drafts
        .into_iter()
        .enumerate()
        .map(|(index, draft)| DraftCheck {
            position: index + 1,
            name: draft.name.clone(),
            result: draft.into_definition(),
        })
        .collect())
}

pub(crate) fn validate_rules(args: ValidateRulesArgs) -> Result<(), AppError> {
    let raw = std::fs::read_to_string(&args.path)?;
    let checks = check_drafts(&raw)?;

    println!("Rule validation: {}", args.path.display());
    let mut first_failure = None;
    for check in checks {
        match check.result {
            Ok(definition) => println!(
                "  [{}] ok      {} ({} / {})",
                check.position,
                definition.name,
                definition.severity.label(),
                if definition.is_active { "active" } else { "inactive" },
            ),
            Err(err) => {
                println!("  [{}] invalid {}: {}", check.position, check.name, err);
                first_failure.get_or_insert(err);
            }
        }
    }

    match first_failure {
        Some(err) => Err(ComplianceError::Validation(err).into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_each_draft_independently() {
        let raw = r#"[
            {"name": "GPL on file", "conditionType": "ALWAYS", "requirementType": "DOCUMENT_EXISTS", "requirementTag": "GPL"},
            {"name": "Death date", "conditionType": "STAGE_GTE", "conditionValue": "SOMEDAY", "requirementType": "FIELD_COMPLETED", "requirementField": "decedent.dateOfDeath"}
        ]"#;

        let checks = check_drafts(raw).expect("drafts parse");

        assert_eq!(checks.len(), 2);
        assert!(checks[0].result.is_ok());
        assert!(matches!(
            checks[1].result,
            Err(RuleValidationError::InvalidOperand { operand: "conditionValue", .. })
        ));
    }

    #[test]
    fn unknown_condition_types_fail_to_parse() {
        let raw = r#"[{"name": "x", "conditionType": "SOMETIMES", "requirementType": "DOCUMENT_EXISTS"}]"#;
        assert!(check_drafts(raw).is_err());
    }
}
