//! SMTP email via lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::NotificationChannel;
use crate::alerting::alert::Notification;
use crate::config::EmailSettings;
use crate::error::ChannelError;

pub struct EmailChannel {
    id: String,
    from: Mailbox,
    to: Vec<Mailbox>,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl std::fmt::Debug for EmailChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailChannel")
            .field("id", &self.id)
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

impl EmailChannel {
    /// Parses addresses and prepares the transport. No connection is made
    /// until the first send.
    pub fn new(id: impl Into<String>, settings: &EmailSettings) -> Result<Self, ChannelError> {
        let id = id.into();
        if settings.to.is_empty() {
            return Err(ChannelError::Misconfigured(format!("{id}: no recipients")));
        }
        let from: Mailbox = settings.from.parse()?;
        let to = settings
            .to
            .iter()
            .map(|addr| addr.parse::<Mailbox>())
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = if settings.secure {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.smtp_host)
        }
        .port(settings.smtp_port);
        if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            id,
            from,
            to,
            transport: builder.build(),
        })
    }

    pub(crate) fn message(&self, notification: &Notification) -> Result<Message, ChannelError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(notification.title())
            .header(ContentType::TEXT_PLAIN);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        Ok(builder.body(notification.format_message())?)
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "email"
    }

    async fn send(&self, notification: &Notification) -> Result<(), ChannelError> {
        let message = self.message(notification)?;
        self.transport.send(message).await?;
        Ok(())
    }
}
