use super::super::super::domain::DocumentStatus;
use super::super::super::snapshot::{CaseSnapshot, FieldValue};
use super::super::rules::RuleRequirement;

/// Whether the case currently meets `requirement`.
pub fn satisfied(requirement: &RuleRequirement, snapshot: &CaseSnapshot) -> bool {
    match requirement {
        RuleRequirement::DocumentExists { tag } => snapshot
            .document_status(tag)
            .is_some_and(DocumentStatus::is_on_file),
        RuleRequirement::DocumentSigned {
            tag,
            requires_signed,
        } => match snapshot.document_status(tag) {
            Some(DocumentStatus::Signed) => true,
            Some(DocumentStatus::Generated) => !requires_signed,
            _ => false,
        },
        RuleRequirement::FieldCompleted { field } => snapshot
            .field(field)
            .is_some_and(FieldValue::is_present),
        RuleRequirement::SignatureCompleted { tag } => snapshot.signature_completed(tag),
    }
}
