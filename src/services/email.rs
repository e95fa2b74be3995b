//! Outbound email behind a provider trait.
//!
//! Delivery is consumed as fire-and-forget jobs (see `tasks`); nothing in the
//! request path waits on SMTP.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::SmtpConfig;
use crate::error::ServiceError;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_verification_email(
        &self,
        to_email: &str,
        verification_token: &str,
        base_url: &str,
    ) -> Result<(), ServiceError>;

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        base_url: &str,
    ) -> Result<(), ServiceError>;

    async fn send_security_alert(
        &self,
        to_email: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from_email: String,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, ServiceError> {
        let creds = Credentials::new(config.username.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.from_address.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: &str,
        html_body: &str,
    ) -> Result<(), ServiceError> {
        let email = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e: lettre::address::AddressError| {
                        ServiceError::Internal(e.into())
                    })?,
            )
            .to(to_email
                .parse()
                .map_err(|e: lettre::address::AddressError| ServiceError::Internal(e.into()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )
            .map_err(|e| ServiceError::Internal(e.into()))?;

        // Send on the blocking pool so SMTP never stalls the runtime.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| ServiceError::Internal(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(to = %to_email, error = %e, "Failed to send email");
                Err(ServiceError::Email(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_verification_email(
        &self,
        to_email: &str,
        verification_token: &str,
        base_url: &str,
    ) -> Result<(), ServiceError> {
        let link = format!("{}/verify-email?token={}", base_url, verification_token);

        let plain_body = format!(
            "Please verify your email address.\n\n\
             Visit the following link to verify your account:\n\n{}\n\n\
             This link expires in 24 hours. If you didn't request this, ignore this email.",
            link
        );
        let html_body = format!(
            "<html><body><h2>Verify your email</h2>\
             <p>Please click the link below to verify your email address:</p>\
             <p><a href=\"{}\">Verify Email</a></p>\
             <p>This link expires in 24 hours. If you didn't request this, ignore this email.</p>\
             </body></html>",
            link
        );

        self.send_email(to_email, "Verify Your Email Address", &plain_body, &html_body)
            .await
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        base_url: &str,
    ) -> Result<(), ServiceError> {
        let link = format!("{}/reset-password?token={}", base_url, reset_token);

        let plain_body = format!(
            "We received a request to reset your password.\n\n\
             Visit the following link to set a new password:\n\n{}\n\n\
             This link expires in 1 hour. If you didn't request this, ignore this email.",
            link
        );
        let html_body = format!(
            "<html><body><h2>Password Reset Request</h2>\
             <p>Click the link below to set a new password:</p>\
             <p><a href=\"{}\">Reset Password</a></p>\
             <p>This link expires in 1 hour. If you didn't request this, ignore this email.</p>\
             </body></html>",
            link
        );

        self.send_email(to_email, "Reset Your Password", &plain_body, &html_body)
            .await
    }

    async fn send_security_alert(
        &self,
        to_email: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), ServiceError> {
        let html_body = format!(
            "<html><body><h2>{}</h2><pre>{}</pre></body></html>",
            subject, body
        );
        self.send_email(to_email, subject, body, &html_body).await
    }
}

/// Recorded outbound email, for assertions in tests.
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub token: Option<String>,
}

#[derive(Default)]
pub struct MockEmailService {
    pub sent: Mutex<Vec<SentEmail>>,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, to: &str, subject: &str, token: Option<&str>) {
        self.sent
            .lock()
            .expect("mock mailer poisoned")
            .push(SentEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                token: token.map(|t| t.to_string()),
            });
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_verification_email(
        &self,
        to_email: &str,
        verification_token: &str,
        _base_url: &str,
    ) -> Result<(), ServiceError> {
        self.record(to_email, "Verify Your Email Address", Some(verification_token));
        Ok(())
    }

    async fn send_password_reset_email(
        &self,
        to_email: &str,
        reset_token: &str,
        _base_url: &str,
    ) -> Result<(), ServiceError> {
        self.record(to_email, "Reset Your Password", Some(reset_token));
        Ok(())
    }

    async fn send_security_alert(
        &self,
        to_email: &str,
        subject: &str,
        _body: &str,
    ) -> Result<(), ServiceError> {
        self.record(to_email, subject, None);
        Ok(())
    }
}
