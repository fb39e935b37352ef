use async_trait::async_trait;
use lettre::{
    Message, SmtpTransport, Transport,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::sync::{Arc, Mutex};

// 1. Mailer Contract
/// Mailer
///
/// Abstract contract for dispatching confirmation-code mail. The trait lets us
/// swap the SMTP implementation for the logging one (no SMTP host configured)
/// or the recording mock in tests without touching the handlers.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Delivers the confirmation code to `email`. Dispatch is synchronous with
    /// the registration request; callers decide what a failure means for the
    /// request outcome.
    async fn send_confirmation_code(
        &self,
        username: &str,
        email: &str,
        code: &str,
    ) -> Result<(), String>;
}

const MAIL_SUBJECT: &str = "E-mail verification";

fn mail_body(code: &str) -> String {
    format!("Your confirmation_code is {code}")
}

// 2. The Real Implementation (SMTP relay)
/// SmtpMailer
///
/// Sends through an authenticated SMTP relay. The transport is built once and
/// reused; lettre pools connections internally.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(host: &str, username: &str, password: &str, from: &str) -> Result<Self, String> {
        let from: Mailbox = from
            .parse()
            .map_err(|_| format!("Invalid from address: {from}"))?;

        let creds = Credentials::new(username.to_string(), password.to_string());
        let transport = SmtpTransport::relay(host)
            .map_err(|e| format!("Failed to create mailer: {e}"))?
            .credentials(creds)
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_confirmation_code(
        &self,
        username: &str,
        email: &str,
        code: &str,
    ) -> Result<(), String> {
        let to: Mailbox = format!("{username} <{email}>")
            .parse()
            .map_err(|_| format!("Invalid to address: {email}"))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .header(ContentType::TEXT_PLAIN)
            .subject(MAIL_SUBJECT)
            .body(mail_body(code))
            .map_err(|_| "Failed to build email".to_string())?;

        self.transport
            .send(&message)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

// 3. The Logging Implementation (no SMTP configured)
/// LogMailer
///
/// Used when `SMTP_HOST` is unset (local development): the code is written to
/// the log instead of being delivered, so the register → token flow stays
/// usable without a relay.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_confirmation_code(
        &self,
        username: &str,
        email: &str,
        code: &str,
    ) -> Result<(), String> {
        tracing::info!(username, email, code, "confirmation code (mail not configured)");
        Ok(())
    }
}

// 4. The Mock Implementation (For Tests)
/// MockMailer
///
/// Records every dispatched (email, code) pair so tests can assert on resend
/// behaviour and read the code back for the token exchange.
#[derive(Default)]
pub struct MockMailer {
    pub sent: Mutex<Vec<(String, String)>>,
    /// When true, every send reports a delivery failure.
    pub should_fail: bool,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            should_fail: true,
        }
    }

    /// The code most recently mailed to `email`, if any.
    pub fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_confirmation_code(
        &self,
        _username: &str,
        email: &str,
        code: &str,
    ) -> Result<(), String> {
        if self.should_fail {
            return Err("Mock mail error: simulation requested".to_string());
        }
        self.sent
            .lock()
            .unwrap()
            .push((email.to_string(), code.to_string()));
        Ok(())
    }
}

/// MailerState
///
/// The concrete type used to share the mail service across the application state.
pub type MailerState = Arc<dyn Mailer>;
