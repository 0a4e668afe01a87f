use crate::infra::{
    content_type_for, InMemoryDocumentStore, LocalStorage, LoggingNotificationSink,
    StubAnalysisBackend,
};
use chrono::NaiveDate;
use clap::{Args, ValueEnum};
use docverify::config::{AnalysisConfig, UploadPolicy};
use docverify::error::AppError;
use docverify::workflows::verification::{
    AccessError, AccessTokenIssuer, ActorClaims, AnalysisAdapter, BackgroundCheckCoordinator, Document,
    DocumentLifecycle, DocumentType, OwnerId, UploadSlotRequest,
};
use std::sync::Arc;

const DEMO_CONTAINER: &str = "documents";
const DEMO_REVIEWER: &str = "demo-reviewer";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Owner submitting the document
    #[arg(long, default_value = "U1")]
    pub(crate) owner: String,
    /// File name used for the upload slot
    #[arg(long, default_value = "passport.pdf")]
    pub(crate) file_name: String,
    /// Document category, which selects the extraction model
    #[arg(long, value_enum, default_value_t = DemoDocumentType::IdentityDocument)]
    pub(crate) document_type: DemoDocumentType,
    /// Declared upload size in bytes
    #[arg(long, default_value_t = 250_000)]
    pub(crate) size_bytes: u64,
    /// Reject with this reason instead of approving
    #[arg(long)]
    pub(crate) reject_with: Option<String>,
    /// Also run a background check for the owner
    #[arg(long)]
    pub(crate) background_check: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum DemoDocumentType {
    IdentityDocument,
    ProofOfResidence,
    CriminalRecord,
    ProofOfIncome,
    Other,
}

impl From<DemoDocumentType> for DocumentType {
    fn from(value: DemoDocumentType) -> Self {
        match value {
            DemoDocumentType::IdentityDocument => DocumentType::IdentityDocument,
            DemoDocumentType::ProofOfResidence => DocumentType::ProofOfResidence,
            DemoDocumentType::CriminalRecord => DocumentType::CriminalRecord,
            DemoDocumentType::ProofOfIncome => DocumentType::ProofOfIncome,
            DemoDocumentType::Other => DocumentType::Other,
        }
    }
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        owner,
        file_name,
        document_type,
        size_bytes,
        reject_with,
        background_check,
    } = args;
    let document_type = DocumentType::from(document_type);
    let owner_id = OwnerId(owner);

    let storage = Arc::new(LocalStorage::new(
        "http://127.0.0.1:10000/demo",
        "demo-signing-key",
    ));
    let issuer = Arc::new(AccessTokenIssuer::new(storage.clone(), DEMO_CONTAINER));
    let analysis = Arc::new(AnalysisAdapter::new(
        Arc::new(StubAnalysisBackend),
        AnalysisConfig::default().timeout,
    ));
    let lifecycle = DocumentLifecycle::new(
        Arc::new(InMemoryDocumentStore::default()),
        Arc::new(LoggingNotificationSink),
        issuer,
        analysis,
    )
    .with_upload_policy(UploadPolicy::default());

    println!("Document Verification Demo");
    println!("==========================");

    let content_type = content_type_for(&file_name);
    let slot = lifecycle
        .request_upload_slot(UploadSlotRequest {
            owner_id: owner_id.clone(),
            document_type,
            file_name: file_name.clone(),
            content_type: content_type.clone(),
            size_bytes,
        })
        .await?;
    println!("\nUpload slot");
    println!("- storage path: {}", slot.storage_path);
    println!("- content type: {content_type}");
    println!(
        "- permissions: {} (expires {})",
        slot.grant.permissions.as_sas(),
        slot.grant.expires_at.to_rfc3339()
    );

    storage
        .put_object(DEMO_CONTAINER, &slot.storage_path)
        .map_err(|source| AccessError::Storage {
            operation: "simulate client upload",
            source,
        })?;
    println!("- uploaded {size_bytes} bytes");

    let document = lifecycle
        .create(owner_id.clone(), document_type, &file_name, &slot.storage_path)
        .await?;
    print_document("Registered", &document);

    let document = lifecycle.mark_as_pending_verification(document.id()).await?;
    print_document("Upload confirmed", &document);

    let outcome = lifecycle.request_analysis(document.id()).await?;
    println!("\nAnalysis ({})", outcome.model_id);
    if outcome.success {
        println!("- confidence: {:.2}", outcome.confidence);
        for (name, value) in &outcome.extracted_fields {
            println!("- {name}: {value}");
        }
    } else {
        println!(
            "- unavailable: {}",
            outcome.error_message.as_deref().unwrap_or("unknown error")
        );
    }

    let reviewer = ActorClaims::admin(DEMO_REVIEWER);
    let document = match reject_with {
        Some(reason) => lifecycle.reject(document.id(), &reviewer, &reason).await?,
        None => lifecycle.approve(document.id(), &reviewer).await?,
    };
    print_document("Reviewed", &document);

    let grant = lifecycle
        .issue_download_grant(document.id(), &ActorClaims::user(owner_id.0.clone()))
        .await?;
    println!(
        "\nDownload grant for {}: {} (expires {})",
        owner_id,
        grant.permissions.as_sas(),
        grant.expires_at.to_rfc3339()
    );

    if background_check {
        let coordinator = BackgroundCheckCoordinator::in_memory();
        let birth_date = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap_or(NaiveDate::MIN);
        let submitted = coordinator
            .submit(&owner_id.0, "Demo Applicant", birth_date)
            .await;
        let polled = coordinator.poll_status(submitted.request_id).await;
        println!("\nBackground check {}", polled.request_id);
        println!("- submitted: {}", submitted.status.label());
        println!("- now: {}", polled.status.label());
        if let Some(details) = polled.details {
            println!("- details: {details}");
        }
    }

    Ok(())
}

fn print_document(heading: &str, document: &Document) {
    println!("\n{heading}");
    println!("- document: {}", document.id());
    println!("- status: {}", document.status());
    if let Some(verified_at) = document.verified_at() {
        println!("- verified at: {}", verified_at.to_rfc3339());
    }
    if let Some(reason) = document.rejection_reason() {
        println!("- rejection reason: {reason}");
    }
}
