//! Read-only projection of a case used for rule evaluation.
//!
//! Field access goes through [`CaseField`]: a closed set of well-known keys
//! (`decedent.dateOfDeath`, `informant.name`, ...) plus the `custom.<name>`
//! escape hatch for organization-defined fields stored in the case's custom
//! field map. Rules cannot reach anything else on the case.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{
    CaseId, CaseRecord, CaseStage, Disposition, DocumentStatus, DocumentTag, OrganizationId,
    ServiceType,
};
use super::compliance::repository::{CaseDirectory, RepositoryError};

const CUSTOM_PREFIX: &str = "custom.";

/// Addressable case field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CaseField {
    DecedentFirstName,
    DecedentLastName,
    DecedentDateOfBirth,
    DecedentDateOfDeath,
    DecedentPlaceOfDeath,
    InformantName,
    InformantRelationship,
    InformantPhone,
    Custom(String),
}

impl CaseField {
    pub const fn known() -> [Self; 8] {
        [
            Self::DecedentFirstName,
            Self::DecedentLastName,
            Self::DecedentDateOfBirth,
            Self::DecedentDateOfDeath,
            Self::DecedentPlaceOfDeath,
            Self::InformantName,
            Self::InformantRelationship,
            Self::InformantPhone,
        ]
    }

    pub fn key(&self) -> String {
        let key = match self {
            Self::DecedentFirstName => "decedent.firstName",
            Self::DecedentLastName => "decedent.lastName",
            Self::DecedentDateOfBirth => "decedent.dateOfBirth",
            Self::DecedentDateOfDeath => "decedent.dateOfDeath",
            Self::DecedentPlaceOfDeath => "decedent.placeOfDeath",
            Self::InformantName => "informant.name",
            Self::InformantRelationship => "informant.relationship",
            Self::InformantPhone => "informant.phone",
            Self::Custom(name) => return format!("{CUSTOM_PREFIX}{name}"),
        };
        key.to_string()
    }

    pub fn parse(raw: &str) -> Result<Self, UnknownFieldError> {
        let raw = raw.trim();
        if let Some(name) = raw.strip_prefix(CUSTOM_PREFIX) {
            let name = name.trim();
            if name.is_empty() {
                return Err(UnknownFieldError(raw.to_string()));
            }
            return Ok(Self::Custom(name.to_string()));
        }

        Self::known()
            .into_iter()
            .find(|field| field.key().eq_ignore_ascii_case(raw))
            .ok_or_else(|| UnknownFieldError(raw.to_string()))
    }
}

impl fmt::Display for CaseField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl TryFrom<String> for CaseField {
    type Error = UnknownFieldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CaseField> for String {
    fn from(value: CaseField) -> Self {
        value.key()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown case field '{0}' (use a known key or custom.<name>)")]
pub struct UnknownFieldError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
}

impl FieldValue {
    pub fn is_present(&self) -> bool {
        match self {
            Self::Text(text) => !text.trim().is_empty(),
            Self::Date(_) => true,
        }
    }
}

/// Normalized view of one case, built fresh for each reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseSnapshot {
    case_id: CaseId,
    organization_id: OrganizationId,
    stage: CaseStage,
    disposition: Option<Disposition>,
    service_type: Option<ServiceType>,
    fields: BTreeMap<CaseField, FieldValue>,
    documents: BTreeMap<DocumentTag, DocumentStatus>,
    signatures: BTreeMap<DocumentTag, bool>,
}

impl CaseSnapshot {
    pub fn from_record(record: &CaseRecord) -> Self {
        let mut fields = BTreeMap::new();
        for field in CaseField::known() {
            if let Some(value) = record.field(&field) {
                fields.insert(field, value);
            }
        }
        for (name, value) in &record.custom_fields {
            fields.insert(CaseField::Custom(name.clone()), FieldValue::Text(value.clone()));
        }

        // Latest document per tag; equal timestamps resolve to the later entry.
        let mut latest_documents = BTreeMap::new();
        for document in &record.documents {
            match latest_documents.get(&document.tag) {
                Some((created_at, _)) if *created_at > document.created_at => {}
                _ => {
                    latest_documents
                        .insert(document.tag.clone(), (document.created_at, document.status));
                }
            }
        }

        let mut latest_requests = BTreeMap::new();
        for request in &record.signature_requests {
            match latest_requests.get(&request.tag) {
                Some((requested_at, _)) if *requested_at > request.requested_at => {}
                _ => {
                    latest_requests
                        .insert(request.tag.clone(), (request.requested_at, request.is_complete()));
                }
            }
        }

        Self {
            case_id: record.case_id.clone(),
            organization_id: record.organization_id.clone(),
            stage: record.stage,
            disposition: record.disposition,
            service_type: record.service_type,
            fields,
            documents: latest_documents
                .into_iter()
                .map(|(tag, (_, status))| (tag, status))
                .collect(),
            signatures: latest_requests
                .into_iter()
                .map(|(tag, (_, complete))| (tag, complete))
                .collect(),
        }
    }

    pub fn case_id(&self) -> &CaseId {
        &self.case_id
    }

    pub fn organization_id(&self) -> &OrganizationId {
        &self.organization_id
    }

    pub fn stage(&self) -> CaseStage {
        self.stage
    }

    pub fn disposition(&self) -> Option<Disposition> {
        self.disposition
    }

    pub fn service_type(&self) -> Option<ServiceType> {
        self.service_type
    }

    pub fn field(&self, field: &CaseField) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Status of the most recent document carrying `tag`.
    pub fn document_status(&self, tag: &DocumentTag) -> Option<DocumentStatus> {
        self.documents.get(tag).copied()
    }

    /// True only when every signer on the latest request for `tag` has completed.
    pub fn signature_completed(&self, tag: &DocumentTag) -> bool {
        self.signatures.get(tag).copied().unwrap_or(false)
    }
}

/// Loads snapshots from the case collaborator, enforcing organization scope.
pub struct SnapshotAccessor<C> {
    cases: Arc<C>,
}

impl<C> Clone for SnapshotAccessor<C> {
    fn clone(&self) -> Self {
        Self {
            cases: self.cases.clone(),
        }
    }
}

impl<C> SnapshotAccessor<C>
where
    C: CaseDirectory,
{
    pub fn new(cases: Arc<C>) -> Self {
        Self { cases }
    }

    /// `Ok(None)` covers both a missing case and a case owned by another organization.
    pub fn load(
        &self,
        organization: &OrganizationId,
        case_id: &CaseId,
    ) -> Result<Option<CaseSnapshot>, RepositoryError> {
        Ok(self
            .cases
            .fetch(organization, case_id)?
            .filter(|record| &record.organization_id == organization)
            .map(|record| CaseSnapshot::from_record(&record)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::cases::domain::{CaseDocument, SignatureRequest, Signer};
    use chrono::{TimeZone, Utc};

    fn record() -> CaseRecord {
        CaseRecord::new(
            CaseId("case-7".to_string()),
            OrganizationId("org-1".to_string()),
            CaseStage::Documents,
        )
    }

    #[test]
    fn field_keys_parse_known_and_custom_names() {
        assert_eq!(
            CaseField::parse("decedent.dateOfDeath"),
            Ok(CaseField::DecedentDateOfDeath)
        );
        assert_eq!(
            CaseField::parse("custom.veteranStatus"),
            Ok(CaseField::Custom("veteranStatus".to_string()))
        );
        assert!(CaseField::parse("decedent.favoriteColor").is_err());
        assert!(CaseField::parse("custom.").is_err());
        for field in CaseField::known() {
            assert_eq!(CaseField::parse(&field.key()), Ok(field.clone()));
        }
    }

    #[test]
    fn latest_document_per_tag_wins() {
        let mut record = record();
        let early = Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 10, 2, 9, 0, 0).unwrap();
        record.documents.push(CaseDocument {
            document_id: "doc-2".to_string(),
            tag: DocumentTag::new("GPL"),
            status: DocumentStatus::Voided,
            created_at: late,
        });
        record.documents.push(CaseDocument {
            document_id: "doc-1".to_string(),
            tag: DocumentTag::new("GPL"),
            status: DocumentStatus::Signed,
            created_at: early,
        });

        let snapshot = CaseSnapshot::from_record(&record);
        assert_eq!(
            snapshot.document_status(&DocumentTag::new("gpl")),
            Some(DocumentStatus::Voided)
        );
        assert_eq!(snapshot.document_status(&DocumentTag::new("SFGSS")), None);
    }

    #[test]
    fn signature_lookup_uses_latest_request() {
        let mut record = record();
        let early = Utc.with_ymd_and_hms(2025, 10, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 10, 3, 9, 0, 0).unwrap();
        record.signature_requests.push(SignatureRequest {
            request_id: "sig-1".to_string(),
            tag: DocumentTag::new("AUTHORIZATION_CREMATION"),
            signers: vec![Signer {
                name: "Next of kin".to_string(),
                completed_at: Some(early),
            }],
            requested_at: early,
        });
        record.signature_requests.push(SignatureRequest {
            request_id: "sig-2".to_string(),
            tag: DocumentTag::new("AUTHORIZATION_CREMATION"),
            signers: vec![
                Signer {
                    name: "Next of kin".to_string(),
                    completed_at: Some(late),
                },
                Signer {
                    name: "Funeral director".to_string(),
                    completed_at: None,
                },
            ],
            requested_at: late,
        });

        let snapshot = CaseSnapshot::from_record(&record);
        assert!(!snapshot.signature_completed(&DocumentTag::new("AUTHORIZATION_CREMATION")));
        assert!(!snapshot.signature_completed(&DocumentTag::new("EMBALMING")));
    }

    #[test]
    fn snapshot_projects_custom_and_known_fields() {
        let mut record = record();
        record.decedent.last_name = Some("Lovelace".to_string());
        record
            .custom_fields
            .insert("veteranStatus".to_string(), "ARMY".to_string());

        let snapshot = CaseSnapshot::from_record(&record);
        assert_eq!(
            snapshot.field(&CaseField::DecedentLastName),
            Some(&FieldValue::Text("Lovelace".to_string()))
        );
        assert!(snapshot
            .field(&CaseField::Custom("veteranStatus".to_string()))
            .is_some_and(FieldValue::is_present));
        assert!(snapshot.field(&CaseField::DecedentDateOfDeath).is_none());
    }
}
