use async_trait::async_trait;
use lettre::message::{header, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{Notification, Notifier};
use crate::config::SmtpConfig;
use crate::{AppError, Result};

/// Sends notifications as plain-text email over SMTP.
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from = Self::sender(config)?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        let builder = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(Self {
            mailer: builder.port(config.port).build(),
            from,
        })
    }

    fn sender(config: &SmtpConfig) -> Result<Mailbox> {
        let address = config.from_address.as_deref().ok_or_else(|| {
            AppError::Validation("SMTP from_address is not configured".to_string())
        })?;
        Ok(Mailbox::new(Some(config.from_name.clone()), address.parse()?))
    }

    fn build_message(&self, receiver: &str, notification: &Notification) -> Result<Message> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(receiver.parse()?)
            .subject(notification.subject())
            .header(header::ContentType::TEXT_PLAIN)
            .body(notification.body())?;
        Ok(message)
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, receiver: &str, notification: Notification) -> Result<()> {
        let message = self.build_message(receiver, &notification)?;
        self.mailer.send(message).await?;
        tracing::debug!(receiver = %receiver, subject = %notification.subject(), "Email sent");
        Ok(())
    }
}
