use serde::{Deserialize, Serialize};

/// Operations offered in the first step, in display order.
pub const OPERATIONS: &[&str] = &[
    "DSM",
    "CRS",
    "MULTITÉCNICA",
    "LEROY",
    "QUIMEX",
    "CIMENTO NACIONAL",
    "NESTLÉ",
    OTHER_OPERATION,
];

/// The free-text option; choosing it requires a custom operation name.
pub const OTHER_OPERATION: &str = "OUTROS";

/// File extensions accepted by the upload step.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "doc", "docx"];

pub const DOC_SIGNED_LABEL: &str = "O documento está assinado?";
pub const DOC_DATED_LABEL: &str = "O documento está datado?";
pub const ALL_ATTACHMENTS_LABEL: &str =
    "Todos os comprovantes relacionados à carga estão em anexo?";
pub const RESPONSIBILITY_LABEL: &str =
    "Declaro que conferi o documento e assumo a responsabilidade pelas informações enviadas.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    #[default]
    SelectOperation,
    VerifyDocument,
    UploadAndSend,
}

impl WizardStep {
    pub fn number(self) -> u8 {
        match self {
            WizardStep::SelectOperation => 1,
            WizardStep::VerifyDocument => 2,
            WizardStep::UploadAndSend => 3,
        }
    }

    pub fn previous(self) -> WizardStep {
        match self {
            WizardStep::SelectOperation | WizardStep::VerifyDocument => WizardStep::SelectOperation,
            WizardStep::UploadAndSend => WizardStep::VerifyDocument,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            WizardStep::SelectOperation => "Selecionar Operação",
            WizardStep::VerifyDocument => "Verificação do Documento",
            WizardStep::UploadAndSend => "Anexar e Enviar Documentos",
        }
    }
}

impl std::fmt::Display for WizardStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Everything the user has entered during one pass through the wizard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub step: WizardStep,
    pub operation_name: String,
    pub custom_operation_note: Option<String>,
    pub doc_signed: bool,
    pub doc_dated: bool,
    pub all_attachments: bool,
    pub responsibility_ack: bool,
    pub responsible_name: String,
    pub submission_complete: bool,
    pub receipt: Option<Receipt>,
}

impl SessionRecord {
    pub fn is_other_operation(&self) -> bool {
        self.operation_name == OTHER_OPERATION
    }
}

/// Summary shown after the report has been sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub operation_name: String,
    pub custom_operation_note: Option<String>,
    pub file_count: usize,
    pub file_names: Vec<String>,
    pub sent_at: String,
}

/// A file uploaded in the last step. Never persisted.
#[derive(Clone)]
pub struct UploadedFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, mime_type: Option<&str>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime_type = match mime_type.map(str::trim) {
            Some(declared) if !declared.is_empty() => declared.to_string(),
            _ => mime_guess::from_path(&name)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        };
        Self {
            name,
            mime_type,
            bytes,
        }
    }

    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }
}

impl std::fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadedFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectOperationRequest {
    pub operation: String,
    #[serde(default)]
    pub custom_operation_note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyDocumentRequest {
    #[serde(default)]
    pub doc_signed: bool,
    #[serde(default)]
    pub doc_dated: bool,
    #[serde(default)]
    pub all_attachments: bool,
    #[serde(default)]
    pub responsibility_ack: bool,
    #[serde(default)]
    pub responsible_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub field: String,
    pub label: String,
    pub required: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WizardView {
    pub session_id: String,
    pub step: u8,
    pub step_title: String,
    pub record: SessionRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checklist: Option<Vec<ChecklistItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_extensions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WizardView {
    pub fn new(session_id: impl Into<String>, record: SessionRecord) -> Self {
        let step = record.step;
        let operations = (step == WizardStep::SelectOperation)
            .then(|| OPERATIONS.iter().map(|op| op.to_string()).collect());
        let checklist = (step == WizardStep::VerifyDocument).then(checklist_items);
        let allowed_extensions = (step == WizardStep::UploadAndSend)
            .then(|| ALLOWED_EXTENSIONS.iter().map(|ext| ext.to_string()).collect());

        Self {
            session_id: session_id.into(),
            step: step.number(),
            step_title: step.title().to_string(),
            record,
            operations,
            checklist,
            allowed_extensions,
            message: None,
        }
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }
}

fn checklist_items() -> Vec<ChecklistItem> {
    [
        ("doc_signed", DOC_SIGNED_LABEL, false),
        ("doc_dated", DOC_DATED_LABEL, false),
        ("all_attachments", ALL_ATTACHMENTS_LABEL, false),
        ("responsibility_ack", RESPONSIBILITY_LABEL, true),
        ("responsible_name", "Nome do responsável", true),
    ]
    .into_iter()
    .map(|(field, label, required)| ChecklistItem {
        field: field.to_string(),
        label: label.to_string(),
        required,
    })
    .collect()
}
