//! Production [`MailTransport`] over authenticated SMTP.

use super::MailTransport;
use crate::config::{MailConfig, SmtpSecurity};
use crate::error::DeliveryError;
use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

/// SMTP submission with the sender's credentials.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn from_config(mail: &MailConfig) -> Result<Self, DeliveryError> {
        let sender = mail
            .sender
            .clone()
            .ok_or(DeliveryError::MissingSetting("sender"))?;
        let password = mail
            .password
            .clone()
            .ok_or(DeliveryError::MissingSetting("password"))?;

        let builder = match mail.security {
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&mail.smtp_host)?
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&mail.smtp_host)?,
        };
        let transport = builder
            .port(mail.smtp_port)
            .credentials(Credentials::new(sender, password))
            .build();

        debug!(
            host = %mail.smtp_host,
            port = mail.smtp_port,
            security = ?mail.security,
            "SMTP transport configured"
        );
        Ok(Self { transport })
    }

    /// Open a connection and authenticate without sending anything.
    pub async fn test_connection(&self) -> Result<bool, DeliveryError> {
        Ok(self.transport.test_connection().await?)
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, message: Message) -> Result<(), DeliveryError> {
        let response = self.transport.send(message).await?;
        debug!(code = %response.code(), "SMTP server accepted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail() -> MailConfig {
        MailConfig {
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            security: SmtpSecurity::StartTls,
            sender: Some("reports@example.com".into()),
            password: Some("secret".into()),
            recipient: Some("treasury@example.com".into()),
        }
    }

    #[tokio::test]
    async fn test_builds_without_connecting() {
        assert!(SmtpMailer::from_config(&mail()).is_ok());
        let mut tls = mail();
        tls.security = SmtpSecurity::Tls;
        tls.smtp_port = 465;
        assert!(SmtpMailer::from_config(&tls).is_ok());
    }

    #[test]
    fn test_requires_password() {
        let mut m = mail();
        m.password = None;
        assert!(matches!(
            SmtpMailer::from_config(&m),
            Err(DeliveryError::MissingSetting("password"))
        ));
    }
}
