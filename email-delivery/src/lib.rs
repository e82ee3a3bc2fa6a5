pub mod smtp_mailer;

pub use smtp_mailer::{build_message, parse_mailbox, MailError, SmtpMailer, SmtpMailerConfig};
