use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::DocumentType;

pub const GENERIC_MODEL: &str = "prebuilt-document";
pub const ANALYSIS_UNAVAILABLE: &str = "analysis service unavailable";
pub const ANALYSIS_TIMED_OUT: &str = "analysis timed out";

/// Extraction model used for each document type. Types not listed use [`GENERIC_MODEL`].
pub fn model_for(document_type: DocumentType) -> &'static str {
    match document_type {
        DocumentType::IdentityDocument => "prebuilt-idDocument",
        DocumentType::ProofOfResidence => "prebuilt-invoice",
        DocumentType::CriminalRecord => "prebuilt-read",
        DocumentType::ProofOfIncome | DocumentType::Other => GENERIC_MODEL,
    }
}

/// Request handed to the remote extraction service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRequest {
    pub object_key: String,
    pub document_url: String,
    pub model_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub name: String,
    pub value: String,
    pub confidence: f32,
}

/// Raw response of the extraction service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub fields: Vec<ExtractedField>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisBackendError {
    #[error("analysis service returned status {status}: {message}")]
    Service { status: u16, message: String },
    #[error("analysis service unreachable: {0}")]
    Transport(String),
}

#[async_trait]
pub trait AnalysisBackend: Debug + Send + Sync {
    async fn analyze(&self, request: AnalysisRequest)
        -> Result<AnalysisResponse, AnalysisBackendError>;
}

/// Normalized extraction result. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutcome {
    pub success: bool,
    pub model_id: String,
    pub extracted_fields: BTreeMap<String, String>,
    pub confidence: f32,
    pub raw_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AnalysisOutcome {
    /// `category` is shown to callers; backend detail stays in the logs.
    fn failed(model_id: &str, category: &str) -> Self {
        Self {
            success: false,
            model_id: model_id.to_string(),
            extracted_fields: BTreeMap::new(),
            confidence: 0.0,
            raw_summary: String::new(),
            error_message: Some(category.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct AnalysisAdapter {
    backend: Arc<dyn AnalysisBackend>,
    timeout: Duration,
}

impl AnalysisAdapter {
    pub fn new(backend: Arc<dyn AnalysisBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub async fn analyze(
        &self,
        object_key: &str,
        document_url: &str,
        document_type: DocumentType,
    ) -> AnalysisOutcome {
        let model_id = model_for(document_type);
        let request = AnalysisRequest {
            object_key: object_key.to_string(),
            document_url: document_url.to_string(),
            model_id: model_id.to_string(),
        };

        let response = match tokio::time::timeout(self.timeout, self.backend.analyze(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                warn!(object_key, model_id, error = %err, "document analysis failed");
                return AnalysisOutcome::failed(model_id, ANALYSIS_UNAVAILABLE);
            }
            Err(_) => {
                warn!(object_key, model_id, timeout = ?self.timeout, "document analysis timed out");
                return AnalysisOutcome::failed(model_id, ANALYSIS_TIMED_OUT);
            }
        };

        // Repeated names keep their last occurrence.
        let mut merged: BTreeMap<String, ExtractedField> = BTreeMap::new();
        for field in response.fields {
            merged.insert(field.name.clone(), field);
        }
        let fields: Vec<ExtractedField> = merged.into_values().collect();
        let confidence = mean_confidence(&fields);
        let extracted_fields: BTreeMap<String, String> = fields
            .into_iter()
            .map(|field| (field.name, field.value))
            .collect();

        debug!(
            object_key,
            model_id,
            fields = extracted_fields.len(),
            confidence,
            "document analysis completed"
        );

        AnalysisOutcome {
            success: true,
            model_id: model_id.to_string(),
            extracted_fields,
            confidence,
            raw_summary: response.content,
            error_message: None,
        }
    }
}

/// Unweighted mean of per-field confidences, each clamped into `[0, 1]`.
fn mean_confidence(fields: &[ExtractedField]) -> f32 {
    if fields.is_empty() {
        return 0.0;
    }

    let total: f64 = fields
        .iter()
        .map(|field| {
            if field.confidence.is_finite() {
                f64::from(field.confidence.clamp(0.0, 1.0))
            } else {
                0.0
            }
        })
        .sum();

    ((total / fields.len() as f64) as f32).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, confidence: f32) -> ExtractedField {
        ExtractedField {
            name: name.to_string(),
            value: "value".to_string(),
            confidence,
        }
    }

    #[test]
    fn model_table_falls_back_to_generic() {
        assert_eq!(model_for(DocumentType::IdentityDocument), "prebuilt-idDocument");
        assert_eq!(model_for(DocumentType::Other), GENERIC_MODEL);
        assert_eq!(model_for(DocumentType::ProofOfIncome), GENERIC_MODEL);
    }

    #[test]
    fn confidence_is_plain_mean() {
        let fields = vec![field("documentNumber", 0.9), field("firstName", 0.5)];
        assert!((mean_confidence(&fields) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn confidence_stays_in_unit_interval() {
        assert_eq!(mean_confidence(&[]), 0.0);
        let odd = vec![field("a", 7.0), field("b", -3.0), field("c", f32::NAN)];
        let confidence = mean_confidence(&odd);
        assert!((0.0..=1.0).contains(&confidence));
        assert!((confidence - 1.0 / 3.0).abs() < 1e-6);
    }
}
