//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::config::MailSettings;
use crate::notifier::{Notifier, SendError, compose_message};

pub fn mail_settings() -> MailSettings {
    MailSettings {
        smtp_host: "smtp.example.com".to_string(),
        smtp_port: 587,
        username: "sender@example.com".to_string(),
        password: "app-password".to_string(),
        from: "sender@example.com".to_string(),
        to: "documents@example.com".to_string(),
    }
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([10, 120, 200]));
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

#[derive(Debug, Clone)]
pub struct SentReport {
    pub operation: String,
    pub note: Option<String>,
    pub report: Vec<u8>,
    pub envelope_to: Vec<String>,
    pub raw_message: String,
}

impl SentReport {
    pub fn report_contains(&self, needle: &[u8]) -> bool {
        self.report.windows(needle.len()).any(|window| window == needle)
    }

    pub fn recipients(&self) -> Vec<&str> {
        self.envelope_to.iter().map(String::as_str).collect()
    }

    pub fn attachment_count(&self) -> usize {
        self.raw_message.matches("Content-Disposition: attachment").count()
    }
}

/// Composes the real message but records it instead of opening a connection.
pub struct RecordingNotifier {
    settings: MailSettings,
    fail: AtomicBool,
    delay_ms: AtomicU64,
    attempts: AtomicUsize,
    sent: Mutex<Vec<SentReport>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            settings: mail_settings(),
            fail: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            attempts: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Simulate a slow SMTP server.
    pub fn delay_sends(&self, millis: u64) {
        self.delay_ms.store(millis, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<SentReport> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_report(
        &self,
        report: &[u8],
        operation: &str,
        note: Option<&str>,
    ) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let message = compose_message(&self.settings, report, operation, note)?;
        if self.fail.load(Ordering::SeqCst) {
            return Err(SendError::Transport("connection refused".to_string()));
        }

        let envelope_to = message
            .envelope()
            .to()
            .iter()
            .map(|address| address.to_string())
            .collect();
        self.sent.lock().unwrap().push(SentReport {
            operation: operation.to_string(),
            note: note.map(str::to_string),
            report: report.to_vec(),
            envelope_to,
            raw_message: String::from_utf8_lossy(&message.formatted()).to_string(),
        });
        Ok(())
    }
}
