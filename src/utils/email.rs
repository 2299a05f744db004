// src/utils/email.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::config::MailConfig;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("invalid mail API url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("mail transport failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Outbound email. Implementations must bound how long a send may block.
#[async_trait]
pub trait EmailClient: Send + Sync {
    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        content: &str,
    ) -> Result<(), EmailError>;
}

/// Sends through a Postmark-compatible HTTP API.
pub struct HttpEmailClient {
    http_client: Client,
    endpoint: Url,
    sender: String,
    authorization_token: String,
}

impl HttpEmailClient {
    pub fn new(config: &MailConfig) -> Result<Self, EmailError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let endpoint = Url::parse(&config.api_url)?.join("/email")?;
        Ok(Self {
            http_client,
            endpoint,
            sender: config.sender.clone(),
            authorization_token: config.api_token.clone(),
        })
    }
}

#[async_trait]
impl EmailClient for HttpEmailClient {
    #[tracing::instrument(name = "Sending email", skip_all)]
    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        content: &str,
    ) -> Result<(), EmailError> {
        let request_body = SendEmailRequest {
            from: &self.sender,
            to: recipient,
            subject,
            html_body: content,
            text_body: content,
            message_stream: MESSAGE_STREAM,
        };

        self.http_client
            .post(self.endpoint.clone())
            .header(AUTH_HEADER, &self.authorization_token)
            .json(&request_body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

const MESSAGE_STREAM: &str = "outbound";
const AUTH_HEADER: &str = "X-Postmark-Server-Token";

#[derive(serde::Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html_body: &'a str,
    text_body: &'a str,
    message_stream: &'a str,
}

/// Development mailer: writes the message to the log instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct LogEmailClient;

#[async_trait]
impl EmailClient for LogEmailClient {
    async fn send_email(
        &self,
        recipient: &str,
        subject: &str,
        content: &str,
    ) -> Result<(), EmailError> {
        tracing::info!(%recipient, %subject, %content, "Email (not sent, no mail transport configured)");
        Ok(())
    }
}

/// Best-effort delivery: a failure is logged and never undoes the state
/// change that triggered the message.
pub async fn notify(client: &dyn EmailClient, recipient: &str, message: Message) {
    if let Err(e) = client
        .send_email(recipient, &message.subject, &message.body)
        .await
    {
        tracing::warn!(%recipient, subject = %message.subject, error = %e, "Failed to send email");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

impl Message {
    pub fn verify_email(link: &str) -> Self {
        Self {
            subject: "Verify your email".to_string(),
            body: format!("Click this link to verify your account:\n{link}"),
        }
    }

    pub fn reset_password(link: &str) -> Self {
        Self {
            subject: "Reset your password".to_string(),
            body: format!("Click here to reset your password: {link}"),
        }
    }

    pub fn login_code(code: &str) -> Self {
        Self {
            subject: "Your login code".to_string(),
            body: format!("Your login code is: {code}"),
        }
    }

    pub fn resent_login_code(code: &str) -> Self {
        Self {
            subject: "Your new login code".to_string(),
            body: format!("Your new 2FA code is: {code}"),
        }
    }
}
