pub mod select_operation;
pub mod upload_and_send;
pub mod verify_document;

use wizard_flow::Transition;

use crate::models::{SessionRecord, WizardStep};
use crate::workflow::{WizardEffect, WizardError};

pub type StepResult = Result<Transition<SessionRecord, WizardEffect>, WizardError>;

/// Reject an action meant for a different step.
pub(crate) fn expect_step(
    record: &SessionRecord,
    expected: WizardStep,
    action: &'static str,
) -> Result<(), WizardError> {
    if record.step == expected {
        Ok(())
    } else {
        Err(WizardError::OutOfStep {
            action,
            expected,
            actual: record.step,
        })
    }
}

/// Changing an answer after a completed send starts a new submission: the
/// old receipt no longer describes what would be mailed.
pub(crate) fn reopened(record: &SessionRecord) -> SessionRecord {
    SessionRecord {
        submission_complete: false,
        receipt: None,
        ..record.clone()
    }
}

/// Step back one screen. Always allowed, nothing is cleared.
pub fn go_back(record: &SessionRecord) -> StepResult {
    Ok(Transition::to(SessionRecord {
        step: record.step.previous(),
        ..record.clone()
    }))
}

/// Discard everything and start a new cycle.
pub fn start_over(_record: &SessionRecord) -> StepResult {
    Ok(Transition::to(SessionRecord::default()).respond("Novo processo iniciado"))
}
