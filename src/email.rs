//! Email delivery abstraction and message composition.
//!
//! The sender decides how to deliver (SMTP, API, etc.) and returns
//! `Ok`/`Err`. The default for local dev is `LogEmailSender`, which logs and
//! returns `Ok(())`, so the OTP flows work end to end without an email
//! provider configured.

use anyhow::Result;
use tracing::info;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    pub html: String,
}

/// Email delivery abstraction used by the OTP flows.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to mark it as failed.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            html = %message.html,
            "email send stub"
        );
        Ok(())
    }
}

/// Password reset code message.
#[must_use]
pub fn password_reset_message(to_email: &str, code: &str) -> EmailMessage {
    EmailMessage {
        to_email: to_email.to_string(),
        subject: "Kalibro Library Password Reset Code".to_string(),
        html: format!(
            "<html><body>\
             <h2>Password Reset</h2>\
             <p>Use the code below to reset your Kalibro Library password:</p>\
             <p style=\"font-size:32px;letter-spacing:8px\"><strong>{code}</strong></p>\
             <p>This code is valid for 10 minutes.</p>\
             <p>If you did not request this, you can safely ignore this email.</p>\
             </body></html>"
        ),
    }
}

/// Registration verification code message.
#[must_use]
pub fn registration_message(to_email: &str, code: &str) -> EmailMessage {
    EmailMessage {
        to_email: to_email.to_string(),
        subject: "Welcome to Kalibro Library - Verify Your Email".to_string(),
        html: format!(
            "<html><body>\
             <h2>Complete Your Registration</h2>\
             <p>Use the code below to verify your email address:</p>\
             <p style=\"font-size:32px;letter-spacing:8px\"><strong>{code}</strong></p>\
             <p>This code is valid for 10 minutes.</p>\
             <p>If you did not sign up, you can safely ignore this email.</p>\
             </body></html>"
        ),
    }
}

/// Confirmation sent after a successful password change.
#[must_use]
pub fn password_changed_message(to_email: &str) -> EmailMessage {
    EmailMessage {
        to_email: to_email.to_string(),
        subject: "Kalibro Library Password Changed".to_string(),
        html: "<html><body>\
               <h2>Password Changed</h2>\
               <p>Your Kalibro Library password was just changed. All of your \
               sessions have been signed out.</p>\
               <p>If this was not you, contact the library staff immediately.</p>\
               </body></html>"
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sender_always_succeeds() {
        let message = password_reset_message("user@example.com", "123456");
        assert!(LogEmailSender.send(&message).is_ok());
    }

    #[test]
    fn messages_carry_the_code() {
        let message = password_reset_message("user@example.com", "654321");
        assert_eq!(message.to_email, "user@example.com");
        assert!(message.html.contains("654321"));
        assert!(message.subject.contains("Password Reset"));

        let message = registration_message("new@example.com", "111222");
        assert!(message.html.contains("111222"));
    }

    #[test]
    fn confirmation_mentions_session_signout() {
        let message = password_changed_message("user@example.com");
        assert!(message.html.contains("signed out"));
    }
}
