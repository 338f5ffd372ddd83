use tracing::info;
use wizard_flow::Transition;

use super::{StepResult, expect_step, reopened};
use crate::models::{OTHER_OPERATION, SelectOperationRequest, SessionRecord, WizardStep};
use crate::validation::validate_select_operation;

/// Step 1: record the chosen operation and move on to the document checklist.
pub fn apply(record: &SessionRecord, request: SelectOperationRequest) -> StepResult {
    expect_step(record, WizardStep::SelectOperation, "select_operation")?;

    let operation = request.operation.trim().to_string();
    // the note only means something for the free-text option
    let custom_operation_note = if operation == OTHER_OPERATION {
        request
            .custom_operation_note
            .map(|note| note.trim().to_string())
    } else {
        None
    };

    let candidate = SessionRecord {
        operation_name: operation,
        custom_operation_note,
        ..reopened(record)
    };
    validate_select_operation(&candidate)?;

    info!(operation = %candidate.operation_name, "Operation selected");
    Ok(Transition::to(SessionRecord {
        step: WizardStep::VerifyDocument,
        ..candidate
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationError;
    use crate::workflow::WizardError;

    fn request(operation: &str, note: Option<&str>) -> SelectOperationRequest {
        SelectOperationRequest {
            operation: operation.to_string(),
            custom_operation_note: note.map(str::to_string),
        }
    }

    #[test]
    fn catalog_operation_advances_and_drops_note() {
        let next = apply(&SessionRecord::default(), request("DSM", Some("ignored")))
            .unwrap()
            .state;
        assert_eq!(next.step, WizardStep::VerifyDocument);
        assert_eq!(next.operation_name, "DSM");
        assert_eq!(next.custom_operation_note, None);
    }

    #[test]
    fn other_operation_keeps_trimmed_note() {
        let next = apply(&SessionRecord::default(), request("OUTROS", Some("  ACME  ")))
            .unwrap()
            .state;
        assert_eq!(next.custom_operation_note.as_deref(), Some("ACME"));
    }

    #[test]
    fn other_operation_without_note_is_blocked() {
        let err = apply(&SessionRecord::default(), request("OUTROS", Some(""))).unwrap_err();
        assert!(matches!(
            err,
            WizardError::Validation(ValidationError::MissingOperationNote)
        ));
    }

    #[test]
    fn wrong_step_is_rejected() {
        let record = SessionRecord {
            step: WizardStep::VerifyDocument,
            ..Default::default()
        };
        let err = apply(&record, request("DSM", None)).unwrap_err();
        assert!(matches!(
            err,
            WizardError::OutOfStep {
                expected: WizardStep::SelectOperation,
                actual: WizardStep::VerifyDocument,
                ..
            }
        ));
    }
}
