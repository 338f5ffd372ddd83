use tracing::info;
use wizard_flow::Transition;

use super::{StepResult, expect_step, reopened};
use crate::models::{SessionRecord, VerifyDocumentRequest, WizardStep};
use crate::validation::validate_verify_document;

/// Step 2: record the checklist answers. Only the acknowledgment and the
/// responsible name gate the next step.
pub fn apply(record: &SessionRecord, request: VerifyDocumentRequest) -> StepResult {
    expect_step(record, WizardStep::VerifyDocument, "verify_document")?;

    let candidate = SessionRecord {
        doc_signed: request.doc_signed,
        doc_dated: request.doc_dated,
        all_attachments: request.all_attachments,
        responsibility_ack: request.responsibility_ack,
        responsible_name: request.responsible_name.trim().to_string(),
        ..reopened(record)
    };
    validate_verify_document(&candidate)?;

    info!(
        doc_signed = candidate.doc_signed,
        doc_dated = candidate.doc_dated,
        all_attachments = candidate.all_attachments,
        "Document checklist recorded"
    );
    Ok(Transition::to(SessionRecord {
        step: WizardStep::UploadAndSend,
        ..candidate
    }))
}
