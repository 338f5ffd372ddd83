//! Step gates. Every check here is a pure function of the session record
//! (and, for the last step, the files being submitted).

use thiserror::Error;

use crate::models::{ALLOWED_EXTENSIONS, OPERATIONS, SessionRecord, UploadedFile};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Select an operation before continuing")]
    MissingOperation,

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Enter the operation name")]
    MissingOperationNote,

    #[error("The responsibility acknowledgment must be checked")]
    ResponsibilityNotAcknowledged,

    #[error("Enter the name of the responsible person")]
    MissingResponsibleName,

    #[error("Attach at least one document")]
    NoFiles,

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("These documents were already sent, start a new process")]
    AlreadySubmitted,
}

impl ValidationError {
    /// Form field the error should be shown next to.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingOperation | ValidationError::UnknownOperation(_) => "operation",
            ValidationError::MissingOperationNote => "custom_operation_note",
            ValidationError::ResponsibilityNotAcknowledged => "responsibility_ack",
            ValidationError::MissingResponsibleName => "responsible_name",
            ValidationError::NoFiles
            | ValidationError::UnsupportedFileType(_)
            | ValidationError::AlreadySubmitted => "files",
        }
    }
}

/// Step 1: an operation from the catalog, plus a name when "other" was picked.
pub fn validate_select_operation(record: &SessionRecord) -> Result<(), ValidationError> {
    let operation = record.operation_name.trim();
    if operation.is_empty() {
        return Err(ValidationError::MissingOperation);
    }
    if !OPERATIONS.contains(&operation) {
        return Err(ValidationError::UnknownOperation(operation.to_string()));
    }
    if record.is_other_operation() && is_blank(record.custom_operation_note.as_deref()) {
        return Err(ValidationError::MissingOperationNote);
    }
    Ok(())
}

/// Step 2: only the acknowledgment and the responsible name are enforced.
/// The signed/dated/attachments answers are recorded as given.
pub fn validate_verify_document(record: &SessionRecord) -> Result<(), ValidationError> {
    if !record.responsibility_ack {
        return Err(ValidationError::ResponsibilityNotAcknowledged);
    }
    if record.responsible_name.trim().is_empty() {
        return Err(ValidationError::MissingResponsibleName);
    }
    Ok(())
}

/// Step 3: at least one file, each with an accepted extension.
pub fn validate_upload(
    record: &SessionRecord,
    files: &[UploadedFile],
) -> Result<(), ValidationError> {
    if record.submission_complete {
        return Err(ValidationError::AlreadySubmitted);
    }
    if files.is_empty() {
        return Err(ValidationError::NoFiles);
    }
    for file in files {
        let accepted = file
            .extension()
            .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()));
        if !accepted {
            return Err(ValidationError::UnsupportedFileType(file.name.clone()));
        }
    }
    Ok(())
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}
