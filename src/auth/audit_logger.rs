// Security event logging

use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

/// Authentication event type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    Registered,
    LoginSuccess,
    LoginFailure { reason: String },
    LockedOut,
    TokenRefreshed,
    Logout,
    PasswordChanged,
    PasswordResetRequested,
    PasswordReset,
    EmailConfirmed,
}

impl AuthEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AuthEvent::Registered => "REGISTERED",
            AuthEvent::LoginSuccess => "LOGIN_SUCCESS",
            AuthEvent::LoginFailure { .. } => "LOGIN_FAILURE",
            AuthEvent::LockedOut => "LOCKED_OUT",
            AuthEvent::TokenRefreshed => "TOKEN_REFRESHED",
            AuthEvent::Logout => "LOGOUT",
            AuthEvent::PasswordChanged => "PASSWORD_CHANGED",
            AuthEvent::PasswordResetRequested => "PASSWORD_RESET_REQUESTED",
            AuthEvent::PasswordReset => "PASSWORD_RESET",
            AuthEvent::EmailConfirmed => "EMAIL_CONFIRMED",
        }
    }

    fn detail(&self) -> Option<&str> {
        match self {
            AuthEvent::LoginFailure { reason } => Some(reason.as_str()),
            _ => None,
        }
    }

    fn is_failure(&self) -> bool {
        matches!(self, AuthEvent::LoginFailure { .. } | AuthEvent::LockedOut)
    }
}

/// Who an event is about
#[derive(Debug, Clone, Default)]
pub struct AuditSubject {
    pub user_id: Option<i64>,
    pub account: Option<String>,
    pub ip_address: Option<String>,
}

/// Audit logger for security events
pub struct AuditLogger {
    db_pool: Option<Arc<PgPool>>,
}

impl AuditLogger {
    /// If `db_pool` is `None`, only structured logging is used.
    pub fn new(db_pool: Option<Arc<PgPool>>) -> Self {
        Self { db_pool }
    }

    /// Log an authentication event.
    ///
    /// Fire-and-forget: spawns a task and never blocks or fails the request.
    pub fn log_auth_event(&self, event: AuthEvent, subject: AuditSubject) {
        let db_pool = self.db_pool.clone();

        tokio::spawn(async move {
            if event.is_failure() {
                warn!(
                    event = event.event_type(),
                    user_id = ?subject.user_id,
                    account = ?subject.account,
                    ip_address = ?subject.ip_address,
                    reason = ?event.detail(),
                    "Authentication event"
                );
            } else {
                info!(
                    event = event.event_type(),
                    user_id = ?subject.user_id,
                    account = ?subject.account,
                    ip_address = ?subject.ip_address,
                    "Authentication event"
                );
            }

            if let Some(pool) = db_pool {
                // INET column: the text is parsed by PostgreSQL, NULL when absent
                if let Err(e) = sqlx::query(
                    "INSERT INTO auth_audit_log (user_id, account, event_type, detail, ip_address, created_at)
                     VALUES ($1, $2, $3, $4, $5::inet, NOW())",
                )
                .bind(subject.user_id)
                .bind(&subject.account)
                .bind(event.event_type())
                .bind(event.detail())
                .bind(subject.ip_address.as_deref())
                .execute(pool.as_ref())
                .await
                {
                    warn!(error = %e, "Failed to write audit log to database");
                }
            }
        });
    }
}
