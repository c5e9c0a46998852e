//! Deliver the report by e-mail.
//!
//! The body states the row count with the noun agreeing with the number
//! (`1 строку`, `2 строки`, `5 строк`, `11 строк`, `21 строку`, ...).

pub mod smtp;

use crate::error::DeliveryError;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::Message;
use std::path::Path;
use tracing::info;

pub use smtp::SmtpMailer;

/// Subject line of every report mail.
pub const SUBJECT: &str = "Отчет с курсами валют";

/// Form of the noun `строка` that agrees with a count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowNoun {
    /// Accusative singular, after 1, 21, 31, ...
    One,
    /// Genitive singular, after 2–4, 22–24, ...
    Few,
    /// Genitive plural: 0, 5–20, 25–30, and every 11–19 ending.
    Many,
}

impl RowNoun {
    pub fn as_str(self) -> &'static str {
        match self {
            RowNoun::One => "строку",
            RowNoun::Few => "строки",
            RowNoun::Many => "строк",
        }
    }
}

pub fn plural_form(count: usize) -> RowNoun {
    if (11..=19).contains(&(count % 100)) {
        return RowNoun::Many;
    }
    match count % 10 {
        1 => RowNoun::One,
        2..=4 => RowNoun::Few,
        _ => RowNoun::Many,
    }
}

/// `Отчет содержит {count} {noun}.`
pub fn compose_body(count: usize) -> String {
    format!("Отчет содержит {count} {}.", plural_form(count).as_str())
}

/// Something that can hand a finished message to a mail server.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, message: Message) -> Result<(), DeliveryError>;
}

/// Addressing for report mails.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub sender: Option<String>,
    pub recipient: Option<String>,
}

/// Builds the report mail and passes it to a [`MailTransport`].
pub struct Notifier<'a> {
    envelope: Envelope,
    transport: &'a dyn MailTransport,
}

impl<'a> Notifier<'a> {
    pub fn new(envelope: Envelope, transport: &'a dyn MailTransport) -> Self {
        Self {
            envelope,
            transport,
        }
    }

    /// Build the message for `artifact` without sending it.
    pub fn build_message(&self, artifact: &Path, row_count: usize) -> Result<Message, DeliveryError> {
        let from = mailbox(self.envelope.sender.as_deref(), "sender")?;
        let to = mailbox(self.envelope.recipient.as_deref(), "recipient")?;

        let content = std::fs::read(artifact).map_err(|source| DeliveryError::Attachment {
            path: artifact.to_path_buf(),
            source,
        })?;
        let filename = artifact
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "report.xlsx".to_string());
        // Infallible for a static, well-formed MIME type.
        let octet_stream = ContentType::parse("application/octet-stream")
            .unwrap_or(ContentType::TEXT_PLAIN);

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(SUBJECT)
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(compose_body(row_count)))
                    .singlepart(Attachment::new(filename).body(content, octet_stream)),
            )?;
        Ok(message)
    }

    /// Send `artifact` with a body describing `row_count` rows.
    pub async fn send(&self, artifact: &Path, row_count: usize) -> Result<(), DeliveryError> {
        let message = self.build_message(artifact, row_count)?;
        self.transport.deliver(message).await?;
        info!(
            recipient = self.envelope.recipient.as_deref().unwrap_or_default(),
            rows = row_count,
            "report mailed"
        );
        Ok(())
    }
}

fn mailbox(value: Option<&str>, setting: &'static str) -> Result<Mailbox, DeliveryError> {
    let value = value
        .filter(|v| !v.trim().is_empty())
        .ok_or(DeliveryError::MissingSetting(setting))?;
    value
        .trim()
        .parse::<Mailbox>()
        .map_err(|source| DeliveryError::Address {
            address: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<Message>>,
    }

    #[async_trait]
    impl MailTransport for Outbox {
        async fn deliver(&self, message: Message) -> Result<(), DeliveryError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    fn envelope() -> Envelope {
        Envelope {
            sender: Some("reports@example.com".into()),
            recipient: Some("treasury@example.com".into()),
        }
    }

    #[test]
    fn test_plural_table() {
        let table = [
            (0, "строк"),
            (1, "строку"),
            (2, "строки"),
            (3, "строки"),
            (4, "строки"),
            (5, "строк"),
            (11, "строк"),
            (12, "строк"),
            (14, "строк"),
            (20, "строк"),
            (21, "строку"),
            (22, "строки"),
            (100, "строк"),
            (101, "строку"),
            (111, "строк"),
            (112, "строк"),
            (1001, "строку"),
        ];
        for (count, expected) in table {
            assert_eq!(plural_form(count).as_str(), expected, "count {count}");
        }
    }

    #[test]
    fn test_compose_body() {
        assert_eq!(compose_body(20), "Отчет содержит 20 строк.");
        assert_eq!(compose_body(21), "Отчет содержит 21 строку.");
        assert_eq!(compose_body(23), "Отчет содержит 23 строки.");
    }

    #[tokio::test]
    async fn test_send_attaches_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("report.xlsx");
        std::fs::write(&artifact, b"PK\x03\x04payload").unwrap();

        let outbox = Outbox::default();
        Notifier::new(envelope(), &outbox)
            .send(&artifact, 20)
            .await
            .unwrap();

        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let to: Vec<String> = sent[0].envelope().to().iter().map(|a| a.to_string()).collect();
        assert_eq!(to, ["treasury@example.com"]);
        let raw = String::from_utf8_lossy(&sent[0].formatted()).to_string();
        assert!(raw.contains("filename=\"report.xlsx\""));
        assert!(raw.contains("application/octet-stream"));
    }

    #[tokio::test]
    async fn test_missing_credentials_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("report.xlsx");
        std::fs::write(&artifact, b"x").unwrap();

        let outbox = Outbox::default();
        let mut env = envelope();
        env.sender = None;
        let err = Notifier::new(env, &outbox)
            .send(&artifact, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::MissingSetting("sender")));
        assert!(outbox.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_artifact() {
        let outbox = Outbox::default();
        let err = Notifier::new(envelope(), &outbox)
            .build_message(Path::new("/nonexistent/report.xlsx"), 3)
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Attachment { .. }));
    }

    #[test]
    fn test_bad_address() {
        let outbox = Outbox::default();
        let mut env = envelope();
        env.recipient = Some("not an address".into());
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("report.xlsx");
        std::fs::write(&artifact, b"x").unwrap();
        let err = Notifier::new(env, &outbox)
            .build_message(&artifact, 3)
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Address { .. }));
    }
}
