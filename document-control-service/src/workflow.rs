use async_trait::async_trait;
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use wizard_flow::{FlowRunner, SessionStorage, Transition, Workflow};

use crate::models::{
    Receipt, SelectOperationRequest, SessionRecord, UploadedFile, VerifyDocumentRequest,
    WizardStep,
};
use crate::notifier::{Notifier, SendError};
use crate::report::{RenderError, ReportBuilder, TIMESTAMP_FORMAT};
use crate::steps;
use crate::validation::ValidationError;

pub const WORKFLOW_ID: &str = "document_control";

/// Everything a user can do on the wizard screens.
#[derive(Debug)]
pub enum WizardAction {
    SelectOperation(SelectOperationRequest),
    VerifyDocument(VerifyDocumentRequest),
    Submit(Vec<UploadedFile>),
    Back,
    StartOver,
}

impl WizardAction {
    pub fn name(&self) -> &'static str {
        match self {
            WizardAction::SelectOperation(_) => "select_operation",
            WizardAction::VerifyDocument(_) => "verify_document",
            WizardAction::Submit(_) => "submit",
            WizardAction::Back => "back",
            WizardAction::StartOver => "start_over",
        }
    }
}

#[derive(Debug)]
pub enum WizardEffect {
    /// Render the report from the record and these files, then mail it
    BuildAndSend { files: Vec<UploadedFile> },
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{action} is not available at step {actual} (expected step {expected})")]
    OutOfStep {
        action: &'static str,
        expected: WizardStep,
        actual: WizardStep,
    },

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Send(#[from] SendError),
}

pub struct DocumentControlWorkflow {
    report_builder: ReportBuilder,
    notifier: Arc<dyn Notifier>,
}

impl DocumentControlWorkflow {
    pub fn new(report_builder: ReportBuilder, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            report_builder,
            notifier,
        }
    }

    async fn build_and_send(
        &self,
        record: SessionRecord,
        files: Vec<UploadedFile>,
    ) -> Result<SessionRecord, WizardError> {
        let file_names: Vec<String> = files.iter().map(|file| file.name.clone()).collect();

        // layout and image re-encoding are CPU bound
        let builder = self.report_builder.clone();
        let snapshot = record.clone();
        let report = tokio::task::spawn_blocking(move || builder.build(&snapshot, &files))
            .await
            .map_err(|e| RenderError::Interrupted(e.to_string()))?
            .inspect_err(|e| error!(error = %e, "Failed to render report"))?;

        self.notifier
            .send_report(
                &report.bytes,
                &record.operation_name,
                record.custom_operation_note.as_deref(),
            )
            .await?;

        info!(
            operation = %record.operation_name,
            files = file_names.len(),
            pages = report.page_count,
            "Submission complete"
        );

        let receipt = Receipt {
            operation_name: record.operation_name.clone(),
            custom_operation_note: record.custom_operation_note.clone(),
            file_count: file_names.len(),
            file_names,
            sent_at: Local::now().format(TIMESTAMP_FORMAT).to_string(),
        };
        Ok(SessionRecord {
            submission_complete: true,
            receipt: Some(receipt),
            ..record
        })
    }
}

#[async_trait]
impl Workflow for DocumentControlWorkflow {
    type State = SessionRecord;
    type Action = WizardAction;
    type Effect = WizardEffect;
    type Error = WizardError;

    fn id(&self) -> &str {
        WORKFLOW_ID
    }

    fn reduce(
        &self,
        record: &SessionRecord,
        action: WizardAction,
    ) -> Result<Transition<SessionRecord, WizardEffect>, WizardError> {
        match action {
            WizardAction::SelectOperation(request) => steps::select_operation::apply(record, request),
            WizardAction::VerifyDocument(request) => steps::verify_document::apply(record, request),
            WizardAction::Submit(files) => steps::upload_and_send::apply(record, files),
            WizardAction::Back => steps::go_back(record),
            WizardAction::StartOver => steps::start_over(record),
        }
    }

    async fn perform(
        &self,
        record: SessionRecord,
        effect: WizardEffect,
    ) -> Result<SessionRecord, WizardError> {
        match effect {
            WizardEffect::BuildAndSend { files } => self.build_and_send(record, files).await,
        }
    }
}

pub type DocumentControlRunner = FlowRunner<DocumentControlWorkflow>;

pub fn create_flow_runner(
    notifier: Arc<dyn Notifier>,
    session_storage: Arc<dyn SessionStorage<SessionRecord>>,
) -> DocumentControlRunner {
    let workflow = Arc::new(DocumentControlWorkflow::new(ReportBuilder::new(), notifier));
    FlowRunner::new(workflow, session_storage)
}

/// Every `every`, drop sessions that have not changed for `idle`.
pub fn spawn_session_sweeper(
    runner: DocumentControlRunner,
    idle: chrono::Duration,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = runner.discard_idle(idle).await {
                warn!(error = %e, "Idle session sweep failed");
            }
        }
    })
}
