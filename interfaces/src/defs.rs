use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One normalized feed entry selected for a run's output.
///
/// `link` is the identity key within a run. Articles are never mutated
/// after the normalizer creates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub body: String,
    pub source_label: String,
}

/// A file attached to an outgoing mail.
#[derive(Debug, Clone)]
pub struct MailAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl MailAttachment {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Everything a transport needs to send one message.
#[derive(Debug, Clone)]
pub struct OutgoingMail {
    pub from: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachment: MailAttachment,
}

// Object style note:
// Transports are constructed once per run and are expected to open their
// session inside `send`. Constructing a transport must never touch the
// network, so a dry run can hold one without side effects.

pub trait MailTransport: Send + Sync {
    /// Short human-readable name used in log lines.
    fn transport_name(&self) -> String;

    /// Open an authenticated session and deliver `mail`.
    fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()>;
}
