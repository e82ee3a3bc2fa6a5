use crate::config::EmailConfig;
use crate::types::{
    ConversionResult, DayNewsError, DeliveryMode, DeliveryReport, MailAttachment, MailTransport,
    OutgoingMail, Result,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Sends the artifact to the reading device, or in dry-run mode states what
/// would have been sent.
pub struct DeliveryDispatcher {
    transport: Arc<dyn MailTransport>,
    from: String,
    recipients: Vec<String>,
    subject: String,
    body: String,
}

impl DeliveryDispatcher {
    pub fn new(transport: Arc<dyn MailTransport>, email: &EmailConfig) -> Self {
        Self {
            transport,
            from: email.from_email.clone(),
            recipients: email.recipients(),
            subject: email.subject.clone(),
            body: email.message_body.clone(),
        }
    }

    pub async fn deliver(&self, conversion: &ConversionResult, mode: DeliveryMode) -> Result<DeliveryReport> {
        let mail = self.prepare(&conversion.artifact_path).await?;
        let report = DeliveryReport {
            recipients: mail.recipients.clone(),
            attachment_name: mail.attachment.file_name.clone(),
            attachment_size: mail.attachment.size(),
            mode,
        };

        if mode == DeliveryMode::DryRun {
            info!(
                "DRY RUN: would send to {}, attachment size {} bytes ({}, subject '{}')",
                report.recipients.join(", "),
                report.attachment_size,
                report.attachment_name,
                mail.subject
            );
            return Ok(report);
        }

        let transport = self.transport.clone();
        let transport_name = transport.transport_name();
        let send_result = tokio::task::spawn_blocking(move || transport.send(&mail))
            .await
            .map_err(|e| DayNewsError::General(format!("mail task panicked: {}", e)))?;

        match send_result {
            Ok(()) => {
                info!(
                    "Delivered to {}, attachment size {} bytes ({}) via {}: sent",
                    report.recipients.join(", "),
                    report.attachment_size,
                    report.attachment_name,
                    transport_name
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    "Delivery to {}, attachment size {} bytes ({}) via {} failed: {:#}",
                    report.recipients.join(", "),
                    report.attachment_size,
                    report.attachment_name,
                    transport_name,
                    e
                );
                Err(DayNewsError::DeliveryFailed {
                    transport: transport_name,
                    reason: format!("{:#}", e),
                })
            }
        }
    }

    async fn prepare(&self, artifact_path: &Path) -> Result<OutgoingMail> {
        info!("Preparing to send email with attachment: {}", artifact_path.display());

        let bytes = tokio::fs::read(artifact_path)
            .await
            .map_err(|e| DayNewsError::DeliveryFailed {
                transport: self.transport.transport_name(),
                reason: format!("cannot read artifact {}: {}", artifact_path.display(), e),
            })?;

        let file_name = artifact_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "daynews.epub".to_string());

        Ok(OutgoingMail {
            from: self.from.clone(),
            recipients: self.recipients.clone(),
            subject: self.subject.clone(),
            body: self.body.clone(),
            attachment: MailAttachment {
                content_type: content_type_for(artifact_path).to_string(),
                file_name,
                bytes,
            },
        })
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("epub") => "application/epub+zip",
        Some("pdf") => "application/pdf",
        Some("mobi") | Some("azw3") => "application/x-mobipocket-ebook",
        _ => "application/octet-stream",
    }
}
