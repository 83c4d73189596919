use crate::delivery::{Channel, Notification};
use anyhow::Context;
use lettre::message::{header::ContentType, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub sender: String,
    pub password: String,
    pub receiver: String,
    pub smtp_server: String,
    pub smtp_port: u16,
}

/// SMTP with STARTTLS. Sends multipart text+HTML when an HTML body is present.
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig) -> anyhow::Result<Self> {
        let from: Mailbox = config
            .sender
            .parse()
            .with_context(|| format!("invalid EMAIL_SENDER: {}", config.sender))?;
        let to: Mailbox = config
            .receiver
            .parse()
            .with_context(|| format!("invalid EMAIL_RECEIVER: {}", config.receiver))?;

        let creds = Credentials::new(config.sender.clone(), config.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
            .with_context(|| format!("invalid SMTP server: {}", config.smtp_server))?
            .port(config.smtp_port)
            .credentials(creds)
            .timeout(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)))
            .build();

        Ok(Self { transport, from, to })
    }

    fn message(&self, notification: &Notification) -> anyhow::Result<Message> {
        let builder = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject_line(notification));

        let message = match &notification.body_html {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                notification.body_text.clone(),
                html.clone(),
            )),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(notification.body_text.clone()),
        };
        message.context("failed to build email")
    }
}

fn subject_line(notification: &Notification) -> String {
    if notification.urgent {
        format!("[緊急] {}", notification.subject)
    } else {
        notification.subject.clone()
    }
}

#[async_trait::async_trait]
impl Channel for EmailChannel {
    fn id(&self) -> &str {
        "email"
    }

    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        let message = self.message(notification)?;
        self.transport
            .send(message)
            .await
            .context("SMTP send failed")?;
        Ok(())
    }
}
