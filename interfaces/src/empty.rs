use crate::defs::MailTransport;
use crate::defs::OutgoingMail;

/// Transport that refuses every send.
///
/// Handed to the dispatcher in dry-run mode so that no code path can reach
/// a live mail server.
pub struct RefusingTransport;

impl MailTransport for RefusingTransport {
    fn transport_name(&self) -> String {
        "refusing".to_owned()
    }

    fn send(&self, mail: &OutgoingMail) -> anyhow::Result<()> {
        // Nothing leaves the host.
        Err(anyhow::anyhow!(
            "refusing to send '{}' to {}: no live transport configured",
            mail.subject,
            mail.recipients.join(", ")
        ))
    }
}
