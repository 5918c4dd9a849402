//! Outbound email delivery.
//!
//! Uses SMTP via lettre. Transport failures are reported as
//! [`SendOutcome::Failed`] rather than errors so one bad send never unwinds
//! the caller's batch.

use std::future::Future;

use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;

/// Errors that can occur while setting up or building email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// No recipients given.
    #[error("Email has no recipients")]
    NoRecipients,
}

/// A rendered email addressed to one or more recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
}

/// Result of handing an email to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Accepted by the relay.
    Sent,
    /// Rejected or not delivered.
    Failed {
        /// Transport error message.
        message: String,
    },
}

impl SendOutcome {
    /// Whether the relay accepted the email.
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Something that can deliver an [`OutgoingEmail`].
pub trait MailTransport: Send + Sync {
    /// Deliver `email`, reporting failures in the outcome.
    fn send(&self, email: &OutgoingEmail) -> impl Future<Output = SendOutcome> + Send;
}

/// SMTP mailer using a STARTTLS relay.
#[derive(Clone)]
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

impl SmtpMailer {
    /// Create a mailer from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the relay or the sender address is invalid.
    pub fn new(config: &EmailConfig) -> Result<Self, EmailError> {
        let address = config
            .from_address
            .parse()
            .map_err(|_| EmailError::InvalidAddress(config.from_address.clone()))?;

        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from: Mailbox::new(Some(config.from_name.clone()), address),
        })
    }

    /// Build the MIME message for `email`.
    ///
    /// # Errors
    ///
    /// Returns error if a recipient is invalid or there are none.
    pub fn build_message(&self, email: &OutgoingEmail) -> Result<Message, EmailError> {
        if email.to.is_empty() {
            return Err(EmailError::NoRecipients);
        }

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(email.subject.as_str())
            .header(ContentType::TEXT_HTML);

        for to in &email.to {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.clone()))?;
            builder = builder.to(mailbox);
        }

        Ok(builder.body(email.html.clone())?)
    }
}

impl MailTransport for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> SendOutcome {
        let message = match self.build_message(email) {
            Ok(message) => message,
            Err(e) => {
                return SendOutcome::Failed {
                    message: e.to_string(),
                };
            }
        };

        match self.mailer.send(message).await {
            Ok(_) => {
                tracing::info!(to = ?email.to, subject = %email.subject, "Email sent successfully");
                SendOutcome::Sent
            }
            Err(e) => {
                tracing::warn!(to = ?email.to, error = %e, "Email delivery failed");
                SendOutcome::Failed {
                    message: e.to_string(),
                }
            }
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use recording::RecordingMailer;

#[cfg(any(test, feature = "test-utils"))]
mod recording {
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
    use std::time::Duration;

    use super::{MailTransport, OutgoingEmail, SendOutcome};

    #[derive(Debug, Default)]
    struct Behaviour {
        fail_with: Option<String>,
        fail_for: Vec<String>,
        delay: Option<Duration>,
    }

    /// [`MailTransport`] that records what it is asked to send.
    ///
    /// Clones share state.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingMailer {
        sent: Arc<Mutex<Vec<OutgoingEmail>>>,
        behaviour: Arc<Mutex<Behaviour>>,
    }

    impl RecordingMailer {
        /// Mailer that accepts everything.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail every send with `message`, or stop failing with `None`.
        pub fn fail_with(&self, message: Option<&str>) {
            self.behaviour().fail_with = message.map(str::to_owned);
        }

        /// Fail sends addressed to `recipient`.
        pub fn fail_for(&self, recipient: &str) {
            self.behaviour().fail_for.push(recipient.to_owned());
        }

        /// Sleep this long before each send.
        pub fn set_delay(&self, delay: Option<Duration>) {
            self.behaviour().delay = delay;
        }

        /// Emails accepted so far.
        #[must_use]
        pub fn sent(&self) -> Vec<OutgoingEmail> {
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        fn behaviour(&self) -> MutexGuard<'_, Behaviour> {
            self.behaviour.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    impl MailTransport for RecordingMailer {
        async fn send(&self, email: &OutgoingEmail) -> SendOutcome {
            let delay = self.behaviour().delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let failure = {
                let behaviour = self.behaviour();
                behaviour.fail_with.clone().or_else(|| {
                    email
                        .to
                        .iter()
                        .find(|to| behaviour.fail_for.contains(to))
                        .map(|to| format!("Connection refused sending to {to}"))
                })
            };
            if let Some(message) = failure {
                return SendOutcome::Failed { message };
            }

            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(email.clone());
            SendOutcome::Sent
        }
    }
}
