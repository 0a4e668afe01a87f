use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier wrapper for stored documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of the party that submitted a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of document, used to pick the extraction model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    IdentityDocument,
    ProofOfResidence,
    CriminalRecord,
    ProofOfIncome,
    #[serde(other)]
    Other,
}

impl DocumentType {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentType::IdentityDocument => "identity_document",
            DocumentType::ProofOfResidence => "proof_of_residence",
            DocumentType::CriminalRecord => "criminal_record",
            DocumentType::ProofOfIncome => "proof_of_income",
            DocumentType::Other => "other",
        }
    }
}

/// Position of a document in the verification state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    PendingVerification,
    Verified,
    Rejected,
}

impl DocumentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::PendingVerification => "pending_verification",
            DocumentStatus::Verified => "verified",
            DocumentStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Verified | DocumentStatus::Rejected)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fields and summary produced by the extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    pub fields: BTreeMap<String, String>,
    pub summary: String,
    pub confidence: f32,
    pub model_id: String,
    pub analyzed_at: DateTime<Utc>,
}

/// Transition attempted from a status where the edge is not defined.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentStateError {
    #[error("cannot {action} a document with status {current}")]
    InvalidTransition {
        action: &'static str,
        current: DocumentStatus,
    },
    #[error("a rejection reason is required")]
    MissingRejectionReason,
}

/// Aggregate root for an uploaded verification document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    owner_id: OwnerId,
    document_type: DocumentType,
    file_name: String,
    storage_path: String,
    status: DocumentStatus,
    uploaded_at: DateTime<Utc>,
    verified_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    extracted_data: Option<ExtractedData>,
}

impl Document {
    pub fn new(
        owner_id: OwnerId,
        document_type: DocumentType,
        file_name: impl Into<String>,
        storage_path: impl Into<String>,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: DocumentId::new(),
            owner_id,
            document_type,
            file_name: file_name.into(),
            storage_path: storage_path.into(),
            status: DocumentStatus::Uploaded,
            uploaded_at,
            verified_at: None,
            rejection_reason: None,
            extracted_data: None,
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn storage_path(&self) -> &str {
        &self.storage_path
    }

    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    pub fn uploaded_at(&self) -> DateTime<Utc> {
        self.uploaded_at
    }

    pub fn verified_at(&self) -> Option<DateTime<Utc>> {
        self.verified_at
    }

    pub fn rejection_reason(&self) -> Option<&str> {
        self.rejection_reason.as_deref()
    }

    pub fn extracted_data(&self) -> Option<&ExtractedData> {
        self.extracted_data.as_ref()
    }

    pub fn mark_as_pending_verification(&mut self) -> Result<(), DocumentStateError> {
        self.expect_status(DocumentStatus::Uploaded, "mark as pending verification")?;
        self.status = DocumentStatus::PendingVerification;
        Ok(())
    }

    pub fn approve(&mut self, at: DateTime<Utc>) -> Result<(), DocumentStateError> {
        self.expect_status(DocumentStatus::PendingVerification, "approve")?;
        self.status = DocumentStatus::Verified;
        self.verified_at = Some(at);
        Ok(())
    }

    pub fn reject(&mut self, reason: &str) -> Result<(), DocumentStateError> {
        self.expect_status(DocumentStatus::PendingVerification, "reject")?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DocumentStateError::MissingRejectionReason);
        }
        self.status = DocumentStatus::Rejected;
        self.rejection_reason = Some(reason.to_string());
        Ok(())
    }

    /// Overwrites any earlier extraction; final states are immutable.
    pub fn record_analysis(&mut self, data: ExtractedData) -> Result<(), DocumentStateError> {
        if self.status.is_terminal() {
            return Err(DocumentStateError::InvalidTransition {
                action: "record analysis for",
                current: self.status,
            });
        }
        self.extracted_data = Some(data);
        Ok(())
    }

    fn expect_status(
        &self,
        expected: DocumentStatus,
        action: &'static str,
    ) -> Result<(), DocumentStateError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(DocumentStateError::InvalidTransition {
                action,
                current: self.status,
            })
        }
    }
}

/// Sanitized representation of a document for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentView {
    pub document_id: DocumentId,
    pub owner_id: OwnerId,
    pub document_type: &'static str,
    pub file_name: String,
    pub status: &'static str,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<ExtractedData>,
}

impl From<&Document> for DocumentView {
    fn from(document: &Document) -> Self {
        Self {
            document_id: document.id,
            owner_id: document.owner_id.clone(),
            document_type: document.document_type.label(),
            file_name: document.file_name.clone(),
            status: document.status.label(),
            uploaded_at: document.uploaded_at,
            verified_at: document.verified_at,
            rejection_reason: document.rejection_reason.clone(),
            extracted_data: document.extracted_data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> Document {
        Document::new(
            OwnerId("owner-1".to_string()),
            DocumentType::IdentityDocument,
            "id.pdf",
            "owner-1/k1",
            Utc::now(),
        )
    }

    fn extraction() -> ExtractedData {
        ExtractedData {
            fields: BTreeMap::from([("documentNumber".to_string(), "X123".to_string())]),
            summary: "1 field".to_string(),
            confidence: 0.9,
            model_id: "prebuilt-idDocument".to_string(),
            analyzed_at: Utc::now(),
        }
    }

    #[test]
    fn new_documents_start_uploaded() {
        let document = document();
        assert_eq!(document.status(), DocumentStatus::Uploaded);
        assert!(document.verified_at().is_none());
        assert!(document.rejection_reason().is_none());
        assert!(document.extracted_data().is_none());
    }

    #[test]
    fn approve_requires_pending_verification() {
        let mut document = document();
        let err = document.approve(Utc::now()).expect_err("uploaded cannot be approved");
        assert_eq!(
            err,
            DocumentStateError::InvalidTransition {
                action: "approve",
                current: DocumentStatus::Uploaded,
            }
        );
        assert!(err.to_string().contains("uploaded"));

        document.mark_as_pending_verification().expect("pending");
        let at = Utc::now();
        document.approve(at).expect("approve");
        assert_eq!(document.status(), DocumentStatus::Verified);
        assert_eq!(document.verified_at(), Some(at));
        assert!(document.rejection_reason().is_none());
    }

    #[test]
    fn reject_trims_and_requires_reason() {
        let mut document = document();
        document.mark_as_pending_verification().expect("pending");
        assert_eq!(
            document.reject("  \t"),
            Err(DocumentStateError::MissingRejectionReason)
        );
        assert_eq!(document.status(), DocumentStatus::PendingVerification);

        document.reject("  blurry ").expect("reject");
        assert_eq!(document.status(), DocumentStatus::Rejected);
        assert_eq!(document.rejection_reason(), Some("blurry"));
        assert!(document.verified_at().is_none());
    }

    #[test]
    fn terminal_states_refuse_every_edge() {
        let mut document = document();
        document.mark_as_pending_verification().expect("pending");
        document.reject("expired").expect("reject");

        assert!(document.mark_as_pending_verification().is_err());
        assert!(document.approve(Utc::now()).is_err());
        assert!(document.reject("again").is_err());
        assert!(document.record_analysis(extraction()).is_err());
        assert!(document.extracted_data().is_none());
        assert_eq!(document.rejection_reason(), Some("expired"));
    }

    #[test]
    fn analysis_can_be_overwritten_before_decision() {
        let mut document = document();
        document.record_analysis(extraction()).expect("uploaded accepts analysis");
        document.mark_as_pending_verification().expect("pending");

        let mut second = extraction();
        second.confidence = 0.4;
        document.record_analysis(second.clone()).expect("overwrite");
        assert_eq!(document.extracted_data(), Some(&second));
    }

    #[test]
    fn unknown_document_types_deserialize_as_other() {
        let parsed: DocumentType = serde_json::from_str("\"driving_licence\"").expect("parses");
        assert_eq!(parsed, DocumentType::Other);
        let parsed: DocumentType = serde_json::from_str("\"identity_document\"").expect("parses");
        assert_eq!(parsed, DocumentType::IdentityDocument);
    }
}
