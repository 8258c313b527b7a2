//! Preview notification
//!
//! Best-effort email alert sent when someone opens the video preview page.
//! Missing configuration and SMTP failures are reported in the
//! [`NotifyOutcome`], never as request errors.
//!
//! # Example
//!
//! ```
//! use video_upload_gateway::config::NotifyConfig;
//! use video_upload_gateway::notify::{PreviewNotifier, VisitDetails};
//!
//! # async fn example() {
//! let notifier = PreviewNotifier::from_config(&NotifyConfig::default());
//! let visit = VisitDetails::new("https://example.com/v.mp4", "unknown", None, None);
//! let outcome = notifier.notify(&visit).await;
//! assert!(!outcome.sent);
//! assert_eq!(outcome.reason.as_deref(), Some("PREVIEW_NOTIFY_TO is not configured."));
//! # }
//! ```

use crate::config::NotifyConfig;
use crate::metrics;
use async_trait::async_trait;
use chrono::Utc;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

mod message;

pub use message::{
    client_ip, compose, escape_html, parse_video_url, NotificationEmail, VisitDetails,
};

/// SMTP command timeout
pub const SMTP_TIMEOUT: Duration = Duration::from_secs(20);

const UNKNOWN_CODE: &str = "UNKNOWN";

/// Result of a notification attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotifyOutcome {
    pub sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// SMTP stage that failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl NotifyOutcome {
    pub fn sent() -> Self {
        Self {
            sent: true,
            reason: None,
            code: None,
            command: None,
        }
    }

    pub fn skipped(reason: &str) -> Self {
        Self {
            sent: false,
            reason: Some(reason.to_string()),
            code: None,
            command: None,
        }
    }
}

/// A failed send
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SendFailure {
    pub message: String,
    /// SMTP reply code, if the server answered
    pub code: Option<String>,
    pub command: Option<String>,
}

impl SendFailure {
    pub fn new(message: impl Into<String>, command: &str) -> Self {
        Self {
            message: message.into(),
            code: None,
            command: Some(command.to_string()),
        }
    }
}

/// Delivers rendered notifications
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, from: &str, to: &str, email: &NotificationEmail)
        -> Result<(), SendFailure>;
}

/// SMTP delivery via lettre
///
/// Implicit TLS when `secure`, otherwise STARTTLS when the server offers it.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &NotifyConfig) -> Result<Self, SendFailure> {
        let host = config.smtp_host.trim();
        let tls_parameters = TlsParameters::new(host.to_string())
            .map_err(|e| SendFailure::new(format!("Invalid SMTP TLS setup: {}", e), "CONN"))?;
        let tls = if config.smtp_secure {
            Tls::Wrapper(tls_parameters)
        } else {
            Tls::Opportunistic(tls_parameters)
        };

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(config.smtp_port)
            .tls(tls)
            .credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_pass.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        tracing::info!(
            host = %host,
            port = config.smtp_port,
            secure = config.smtp_secure,
            "SMTP transport initialized"
        );

        Ok(Self { transport })
    }
}

fn parse_mailboxes(list: &str) -> Result<Vec<Mailbox>, SendFailure> {
    list.split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(|addr| {
            addr.parse::<Mailbox>().map_err(|e| {
                SendFailure::new(format!("Invalid address '{}': {}", addr, e), "ENVELOPE")
            })
        })
        .collect()
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(
        &self,
        from: &str,
        to: &str,
        email: &NotificationEmail,
    ) -> Result<(), SendFailure> {
        let from_addr = parse_mailboxes(from)?
            .into_iter()
            .next()
            .ok_or_else(|| SendFailure::new("No sender address", "ENVELOPE"))?;

        let mut builder = Message::builder().from(from_addr).subject(&email.subject);
        let recipients = parse_mailboxes(to)?;
        if recipients.is_empty() {
            return Err(SendFailure::new("No recipient address", "ENVELOPE"));
        }
        for mailbox in recipients {
            builder = builder.to(mailbox);
        }

        let message = builder
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .map_err(|e| SendFailure::new(e.to_string(), "MESSAGE"))?;

        self.transport.send(message).await.map_err(|e| SendFailure {
            message: e.to_string(),
            code: e.status().map(|code| code.to_string()),
            command: Some(failed_stage(&e).to_string()),
        })?;

        Ok(())
    }
}

/// `CONN` when the server never answered (connect, TLS, timeout), else `SEND`
fn failed_stage(error: &lettre::transport::smtp::Error) -> &'static str {
    if error.status().is_none() && !error.is_response() && !error.is_client() {
        "CONN"
    } else {
        "SEND"
    }
}

/// Transport whose setup failed; every send reports the setup error
struct UnavailableTransport(SendFailure);

#[async_trait]
impl MailTransport for UnavailableTransport {
    async fn send(&self, _: &str, _: &str, _: &NotificationEmail) -> Result<(), SendFailure> {
        Err(self.0.clone())
    }
}

/// Composes and sends preview notifications
pub struct PreviewNotifier {
    config: NotifyConfig,
    transport: Option<Arc<dyn MailTransport>>,
}

impl PreviewNotifier {
    /// Build a notifier; the SMTP transport exists only when SMTP is fully configured
    pub fn from_config(config: &NotifyConfig) -> Self {
        let transport = if smtp_complete(config) {
            match SmtpMailer::new(config) {
                Ok(mailer) => Some(Arc::new(mailer) as Arc<dyn MailTransport>),
                Err(e) => {
                    tracing::warn!(error = %e, "SMTP transport unavailable");
                    Some(Arc::new(UnavailableTransport(e)) as Arc<dyn MailTransport>)
                }
            }
        } else {
            None
        };

        Self {
            config: config.clone(),
            transport,
        }
    }

    /// Build a notifier with an explicit transport
    pub fn with_transport(config: &NotifyConfig, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            config: config.clone(),
            transport: Some(transport),
        }
    }

    fn sender(&self) -> &str {
        if self.config.from.trim().is_empty() {
            &self.config.smtp_user
        } else {
            &self.config.from
        }
    }

    /// Send a notification for `visit`
    #[tracing::instrument(
        name = "notify.preview",
        skip(self, visit),
        fields(video_url = %visit.video_url)
    )]
    pub async fn notify(&self, visit: &VisitDetails) -> NotifyOutcome {
        if self.config.to.trim().is_empty() {
            metrics::record_preview_notification("skipped");
            return NotifyOutcome::skipped("PREVIEW_NOTIFY_TO is not configured.");
        }

        let transport = match (&self.transport, smtp_complete(&self.config)) {
            (Some(transport), true) => transport,
            _ => {
                metrics::record_preview_notification("skipped");
                return NotifyOutcome::skipped("SMTP config is incomplete.");
            }
        };

        let email = compose(
            visit,
            Utc::now(),
            self.config.display_utc_offset_hours,
            &self.config.app_base_url,
        );

        match transport.send(self.sender(), &self.config.to, &email).await {
            Ok(()) => {
                metrics::record_preview_notification("sent");
                tracing::info!(ip = %visit.ip, "Preview notification sent");
                NotifyOutcome::sent()
            }
            Err(failure) => {
                metrics::record_preview_notification("failed");
                tracing::warn!(
                    error = %failure,
                    code = ?failure.code,
                    "Preview notification failed"
                );
                NotifyOutcome {
                    sent: false,
                    reason: Some(format!("SMTP send failed: {}", failure.message)),
                    code: Some(failure.code.unwrap_or_else(|| UNKNOWN_CODE.to_string())),
                    command: Some(failure.command.unwrap_or_else(|| "SEND".to_string())),
                }
            }
        }
    }
}

/// Host, port, user and password are all present
fn smtp_complete(config: &NotifyConfig) -> bool {
    !config.smtp_host.trim().is_empty()
        && config.smtp_port != 0
        && !config.smtp_user.trim().is_empty()
        && !config.smtp_pass.is_empty()
}
