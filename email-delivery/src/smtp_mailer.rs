use interfaces::defs::{MailTransport, OutgoingMail};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid mailbox '{address}': {source}")]
    Address {
        address: String,
        source: lettre::address::AddressError,
    },

    #[error("Invalid attachment content type '{0}'")]
    ContentType(String),

    #[error("Message has no recipients")]
    NoRecipients,

    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

#[derive(Clone)]
pub struct SmtpMailerConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for SmtpMailerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Hide password in logs
        f.debug_struct("SmtpMailerConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("use_tls", &self.use_tls)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Live transport that delivers mail over authenticated SMTP.
///
/// No connection is made until `send` is called.
pub struct SmtpMailer {
    config: SmtpMailerConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpMailerConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<SmtpTransport, MailError> {
        let credentials = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let timeout = Some(Duration::from_secs(self.config.timeout_secs));

        let transport = if self.config.use_tls {
            SmtpTransport::starttls_relay(&self.config.server)?
                .port(self.config.port)
                .credentials(credentials)
                .timeout(timeout)
                .build()
        } else {
            SmtpTransport::builder_dangerous(&self.config.server)
                .port(self.config.port)
                .credentials(credentials)
                .timeout(timeout)
                .build()
        };

        Ok(transport)
    }

    pub fn deliver(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let message = build_message(mail)?;
        let transport = self.transport()?;

        debug!(
            "Opening SMTP session to {}:{} as {} (starttls: {})",
            self.config.server, self.config.port, self.config.username, self.config.use_tls
        );
        transport.send(&message)?;

        info!(
            "Email sent successfully to {} via {}",
            mail.recipients.join(", "),
            self.config.server
        );
        Ok(())
    }
}

impl MailTransport for SmtpMailer {
    fn transport_name(&self) -> String {
        format!("smtp://{}:{}", self.config.server, self.config.port)
    }

    fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        self.deliver(mail).map_err(anyhow::Error::from)
    }
}

/// Parse one `addr` or `Name <addr>` mailbox.
pub fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse::<Mailbox>().map_err(|source| MailError::Address {
        address: address.to_string(),
        source,
    })
}

/// Build the multipart message: a plain-text body plus the artifact.
pub fn build_message(mail: &OutgoingMail) -> Result<Message, MailError> {
    if mail.recipients.is_empty() {
        return Err(MailError::NoRecipients);
    }

    let mut builder = Message::builder()
        .from(parse_mailbox(&mail.from)?)
        .subject(mail.subject.clone());

    for recipient in &mail.recipients {
        builder = builder.to(parse_mailbox(recipient)?);
    }

    let content_type = ContentType::parse(&mail.attachment.content_type)
        .map_err(|_| MailError::ContentType(mail.attachment.content_type.clone()))?;

    let attachment = Attachment::new(mail.attachment.file_name.clone())
        .body(mail.attachment.bytes.clone(), content_type);

    let message = builder.multipart(
        MultiPart::mixed()
            .singlepart(SinglePart::plain(mail.body.clone()))
            .singlepart(attachment),
    )?;

    Ok(message)
}
