//! Case compliance: the case snapshot seen by rules, the rule catalog, and
//! blocker reconciliation.

pub mod compliance;
pub mod domain;
pub mod snapshot;

pub use domain::{
    CaseDocument, CaseId, CaseMutation, CaseRecord, CaseStage, Decedent, Disposition,
    DocumentStatus, DocumentTag, Informant, MutationError, OrganizationId, ServiceType,
    SignatureRequest, Signer,
};
pub use snapshot::{CaseField, CaseSnapshot, FieldValue, SnapshotAccessor, UnknownFieldError};
