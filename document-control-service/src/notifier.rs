use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::{error, info};

use crate::config::MailSettings;

pub const SUBJECT_PREFIX: &str = "CONTROLE DE DOCUMENTOS";
pub const MESSAGE_BODY: &str = "Segue em anexo os documentos.";

#[derive(Debug, Error)]
pub enum SendError {
    #[error("Invalid mail address {address}: {reason}")]
    Address { address: String, reason: String },
    #[error("Failed to compose message: {0}")]
    Compose(String),
    #[error("Mail transport failed: {0}")]
    Transport(String),
}

/// Delivers a rendered report. One attempt, no retries.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_report(
        &self,
        report: &[u8],
        operation: &str,
        note: Option<&str>,
    ) -> Result<(), SendError>;
}

pub fn subject_for(operation: &str, note: Option<&str>) -> String {
    match note {
        Some(note) if !note.is_empty() => format!("{SUBJECT_PREFIX} - {operation} - {note}"),
        _ => format!("{SUBJECT_PREFIX} - {operation}"),
    }
}

pub fn attachment_name(operation: &str) -> String {
    let safe: String = operation
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("controle_documentos_{safe}.pdf")
}

fn parse_mailbox(address: &str) -> Result<Mailbox, SendError> {
    address.parse().map_err(|e: lettre::address::AddressError| SendError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Build the outgoing message: plain-text body plus the report as a PDF attachment.
pub fn compose_message(
    settings: &MailSettings,
    report: &[u8],
    operation: &str,
    note: Option<&str>,
) -> Result<Message, SendError> {
    let pdf = ContentType::parse("application/pdf")
        .map_err(|e| SendError::Compose(e.to_string()))?;

    Message::builder()
        .from(parse_mailbox(&settings.from)?)
        .to(parse_mailbox(&settings.to)?)
        .subject(subject_for(operation, note))
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(MESSAGE_BODY.to_string()))
                .singlepart(Attachment::new(attachment_name(operation)).body(report.to_vec(), pdf)),
        )
        .map_err(|e| SendError::Compose(e.to_string()))
}

/// Sends through an SMTP submission server, upgrading the plaintext
/// connection with STARTTLS before authenticating.
pub struct SmtpNotifier {
    settings: MailSettings,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotifier {
    pub fn new(settings: MailSettings) -> Result<Self, SendError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)
            .map_err(|e| SendError::Transport(e.to_string()))?
            .port(settings.smtp_port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .build();

        Ok(Self {
            settings,
            transport,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_report(
        &self,
        report: &[u8],
        operation: &str,
        note: Option<&str>,
    ) -> Result<(), SendError> {
        let message = compose_message(&self.settings, report, operation, note)?;

        info!(
            host = %self.settings.smtp_host,
            port = self.settings.smtp_port,
            to = %self.settings.to,
            attachment_size = report.len(),
            "Sending report"
        );

        self.transport.send(message).await.map_err(|e| {
            error!(host = %self.settings.smtp_host, error = %e, "Failed to send report");
            SendError::Transport(e.to_string())
        })?;

        info!(to = %self.settings.to, "Report sent");
        Ok(())
    }
}
