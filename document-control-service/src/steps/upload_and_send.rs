use tracing::info;
use wizard_flow::Transition;

use super::{StepResult, expect_step};
use crate::models::{SessionRecord, UploadedFile, WizardStep};
use crate::validation::validate_upload;
use crate::workflow::WizardEffect;

/// Step 3: hand the files over to the report/send effect. The record is
/// only marked complete by the effect itself.
pub fn apply(record: &SessionRecord, files: Vec<UploadedFile>) -> StepResult {
    expect_step(record, WizardStep::UploadAndSend, "submit")?;
    validate_upload(record, &files)?;

    info!(files = files.len(), operation = %record.operation_name, "Submission accepted");
    Ok(Transition::with_effect(
        record.clone(),
        WizardEffect::BuildAndSend { files },
    ))
}
