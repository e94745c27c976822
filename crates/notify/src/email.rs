//! SMTP email notifier via `lettre` with TLS support.
//!
//! Supports STARTTLS and implicit TLS connections.

use crate::traits::{Notification, Notifier, NotifyError};
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use logwarden_core::config::DigestConfig;

/// Sends notifications as emails via SMTP.
#[derive(Debug)]
pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailNotifier {
    /// Build an `EmailNotifier` from SMTP settings.
    ///
    /// Port 465 uses implicit TLS; other ports use STARTTLS unless `tls` is
    /// false. Credentials are attached only when both parts are present.
    pub fn new(
        smtp_host: &str,
        smtp_port: Option<u16>,
        tls: bool,
        credentials: Option<(String, String)>,
        from: &str,
        to: &[String],
    ) -> Result<Self, NotifyError> {
        let from_mailbox: Mailbox = from
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))?;

        let to_mailboxes: Vec<Mailbox> = to
            .iter()
            .map(|addr| {
                addr.parse()
                    .map_err(|e: lettre::address::AddressError| NotifyError::Config(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if to_mailboxes.is_empty() {
            return Err(NotifyError::Config(
                "at least one recipient is required".to_string(),
            ));
        }

        let port = smtp_port.unwrap_or(587);

        let mut builder = if port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else if tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(smtp_host)
                .map_err(|e| NotifyError::Config(e.to_string()))?
                .port(port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host).port(port)
        };

        if let Some((username, password)) = credentials {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from: from_mailbox,
            to: to_mailboxes,
        })
    }

    /// Digest mailer, or `Config` when host, sender or recipients are missing.
    pub fn from_config(config: &DigestConfig) -> Result<Self, NotifyError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| NotifyError::Config("SMTP_HOST not set".into()))?;
        let from = config
            .from
            .as_deref()
            .ok_or_else(|| NotifyError::Config("DIGEST_FROM not set".into()))?;
        let credentials = config
            .smtp_username
            .clone()
            .zip(config.smtp_password.clone());
        Self::new(host, config.smtp_port, config.smtp_tls, credentials, from, &config.to)
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut message_builder = Message::builder().from(self.from.clone());

        for recipient in &self.to {
            message_builder = message_builder.to(recipient.clone());
        }

        let email = message_builder
            .subject(&notification.subject)
            .body(notification.body.clone())
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        tracing::info!(
            channel = "email",
            subject = %notification.subject,
            recipients = self.to.len(),
            "notification delivered"
        );

        Ok(())
    }

    fn channel_name(&self) -> &str {
        "email"
    }
}
