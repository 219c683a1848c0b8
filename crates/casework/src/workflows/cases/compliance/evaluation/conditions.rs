use super::super::super::snapshot::{CaseSnapshot, FieldValue};
use super::super::rules::RuleCondition;

/// Whether `condition` holds for the case. Missing case data never matches.
pub fn applies(condition: &RuleCondition, snapshot: &CaseSnapshot) -> bool {
    match condition {
        RuleCondition::Always => true,
        RuleCondition::DispositionEquals { disposition } => {
            snapshot.disposition() == Some(*disposition)
        }
        RuleCondition::ServiceTypeEquals { service_type } => {
            snapshot.service_type() == Some(*service_type)
        }
        RuleCondition::StageAtLeast { stage } => snapshot.stage().ordinal() >= stage.ordinal(),
        RuleCondition::StageEquals { stage } => snapshot.stage() == *stage,
        RuleCondition::FieldPresent { field } => snapshot
            .field(field)
            .is_some_and(FieldValue::is_present),
    }
}
