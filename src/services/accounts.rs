// Accounts, credentials and sessions

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::{bounded_text, rbac, ServiceContext};
use crate::auth::audit_logger::{AuditLogger, AuditSubject, AuthEvent};
use crate::auth::jwt::JwtCodec;
use crate::auth::password::PasswordHasher;
use crate::auth::tokens::OpaqueToken;
use crate::config::Config;
use crate::core::constants::auth as rules;
use crate::core::errors::{GameError, GameResult};
use crate::core::models::*;
use crate::store::StoreTx;

const MAX_PASSWORD_CHARS: usize = 128;
const MAX_EMAIL_CHARS: usize = 254;
const MAX_NICKNAME_CHARS: usize = 50;

/// Identity of the caller, set by the auth middleware
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
    pub account: String,
}

/// The signed-in user's own view of their account
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub account: String,
    pub email: String,
    pub nickname: String,
    pub is_active: bool,
    pub email_confirmed: bool,
    pub shopping_permission: bool,
    pub message_permission: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub permissions: Vec<Permission>,
}

impl UserProfile {
    fn build(user: &User, permissions: Vec<Permission>) -> Self {
        Self {
            id: user.id,
            account: user.account.clone(),
            email: user.email.clone(),
            nickname: user.nickname.clone(),
            is_active: user.is_active,
            email_confirmed: user.email_confirmed,
            shopping_permission: user.shopping_permission,
            message_permission: user.message_permission,
            created_at: user.created_at,
            last_login_at: user.last_login_at,
            permissions,
        }
    }
}

/// Access + refresh token pair returned on register, login and refresh
#[derive(Debug, Clone, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub user: UserProfile,
}

#[derive(Debug, Clone)]
pub struct Registration<'a> {
    pub account: &'a str,
    pub email: &'a str,
    pub nickname: &'a str,
    pub password: &'a str,
}

pub struct AccountService {
    ctx: ServiceContext,
    jwt: JwtCodec,
    hasher: PasswordHasher,
    audit: Arc<AuditLogger>,
    refresh_ttl: Duration,
}

fn validate_account(account: &str) -> GameResult<&str> {
    let account = account.trim();
    let len = account.chars().count();
    if len < rules::ACCOUNT_MIN_CHARS
        || len > rules::ACCOUNT_MAX_CHARS
        || !account.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(GameError::validation(format!(
            "Account must be {} to {} letters, digits or underscores",
            rules::ACCOUNT_MIN_CHARS,
            rules::ACCOUNT_MAX_CHARS
        )));
    }
    Ok(account)
}

fn validate_email(email: &str) -> GameResult<&str> {
    let email = email.trim();
    let valid = email.len() <= MAX_EMAIL_CHARS
        && email
            .split_once('@')
            .map_or(false, |(local, domain)| !local.is_empty() && !domain.is_empty());
    if !valid {
        return Err(GameError::validation("Invalid email address"));
    }
    Ok(email)
}

fn validate_password(password: &str) -> GameResult<()> {
    let len = password.chars().count();
    if len < rules::PASSWORD_MIN_CHARS || len > MAX_PASSWORD_CHARS {
        return Err(GameError::validation(format!(
            "Password must be at least {} characters",
            rules::PASSWORD_MIN_CHARS
        )));
    }
    Ok(())
}

impl AccountService {
    pub fn new(
        ctx: ServiceContext,
        config: &Config,
        audit: Arc<AuditLogger>,
    ) -> GameResult<Self> {
        Ok(Self {
            ctx,
            jwt: JwtCodec::from_config(config),
            hasher: PasswordHasher::new(config.argon2_memory_kib, config.argon2_iterations)?,
            audit,
            refresh_ttl: Duration::seconds(config.refresh_token_ttl_secs as i64),
        })
    }

    fn audit(&self, event: AuthEvent, user: Option<&User>, account: Option<&str>, ip: Option<&str>) {
        self.audit.log_auth_event(
            event,
            AuditSubject {
                user_id: user.map(|u| u.id),
                account: user
                    .map(|u| u.account.clone())
                    .or_else(|| account.map(str::to_string)),
                ip_address: ip.map(str::to_string),
            },
        );
    }

    /// Store a fresh token of `purpose` and return its plaintext
    async fn store_token(
        tx: &mut dyn StoreTx,
        user_id: i64,
        purpose: TokenPurpose,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> GameResult<(OpaqueToken, DateTime<Utc>)> {
        let token = OpaqueToken::generate();
        let expires_at = now + ttl;
        tx.insert_user_token(&UserToken {
            id: 0,
            user_id,
            purpose,
            token_hash: token.hash().as_str().to_string(),
            expires_at,
            created_at: now,
        })
        .await?;
        Ok((token, expires_at))
    }

    async fn queue_email(
        tx: &mut dyn StoreTx,
        to: &str,
        subject: &str,
        body: String,
        now: DateTime<Utc>,
    ) -> GameResult<()> {
        tx.insert_email(&QueuedEmail {
            id: 0,
            to_email: to.to_string(),
            subject: subject.to_string(),
            body,
            created_at: now,
            sent_at: None,
        })
        .await?;
        Ok(())
    }

    /// Persist a refresh token for `user`; the access token is minted by
    /// `finish_session` once the transaction committed.
    async fn open_session(
        &self,
        tx: &mut dyn StoreTx,
        user: &User,
        now: DateTime<Utc>,
    ) -> GameResult<PendingSession> {
        let (refresh, refresh_expires_at) =
            Self::store_token(tx, user.id, TokenPurpose::Refresh, now, self.refresh_ttl).await?;
        let permissions = rbac::permissions_in(tx, user.id).await?.into_iter().collect();
        Ok(PendingSession {
            refresh,
            refresh_expires_at,
            profile: UserProfile::build(user, permissions),
        })
    }

    fn finish_session(&self, pending: PendingSession, now: DateTime<Utc>) -> GameResult<AuthTokens> {
        let (access_token, expires_at) =
            self.jwt
                .issue(pending.profile.id, &pending.profile.account, now)?;
        Ok(AuthTokens {
            access_token,
            token_type: "Bearer",
            expires_at,
            refresh_token: pending.refresh.expose_secret().to_string(),
            refresh_expires_at: pending.refresh_expires_at,
            user: pending.profile,
        })
    }

    pub async fn register(&self, registration: Registration<'_>) -> GameResult<AuthTokens> {
        let account = validate_account(registration.account)?;
        let email = validate_email(registration.email)?;
        let nickname = bounded_text("Nickname", registration.nickname, 1, MAX_NICKNAME_CHARS)?;
        validate_password(registration.password)?;
        let password_hash = self.hasher.hash(registration.password)?;

        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        if tx.user_by_account(account).await?.is_some() {
            return Err(GameError::conflict("Account already registered"));
        }
        if tx.user_by_email(email).await?.is_some() {
            return Err(GameError::conflict("Email already registered"));
        }

        let user = tx
            .insert_user(&User {
                id: 0,
                account: account.to_string(),
                email: email.to_string(),
                nickname: nickname.to_string(),
                password_hash,
                is_active: true,
                email_confirmed: false,
                shopping_permission: true,
                message_permission: true,
                access_failed_count: 0,
                lockout_end: None,
                created_at: now,
                last_login_at: None,
            })
            .await?;
        tx.insert_wallet(&Wallet {
            user_id: user.id,
            points: 0,
            updated_at: now,
        })
        .await?;

        let (confirmation, _) = Self::store_token(
            tx.as_mut(),
            user.id,
            TokenPurpose::EmailConfirmation,
            now,
            Duration::hours(rules::EMAIL_CONFIRMATION_TTL_HOURS),
        )
        .await?;
        Self::queue_email(
            tx.as_mut(),
            &user.email,
            "Confirm your GameSpace email",
            format!(
                "Hi {}, confirm your email with this code: {}",
                user.nickname,
                confirmation.expose_secret()
            ),
            now,
        )
        .await?;

        let pending = self.open_session(tx.as_mut(), &user, now).await?;
        tx.commit().await?;

        info!(user_id = user.id, account = %user.account, "User registered");
        self.audit(AuthEvent::Registered, Some(&user), None, None);
        self.finish_session(pending, now)
    }

    pub async fn login(
        &self,
        account: &str,
        password: &str,
        ip: Option<&str>,
    ) -> GameResult<AuthTokens> {
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;

        let Some(mut user) = tx.user_by_account(account.trim()).await? else {
            self.audit(
                AuthEvent::LoginFailure { reason: "Unknown account".into() },
                None,
                Some(account),
                ip,
            );
            return Err(GameError::Unauthorized("Invalid credentials".into()));
        };

        if user.is_locked(now) {
            self.audit(AuthEvent::LockedOut, Some(&user), None, ip);
            return Err(GameError::Locked);
        }
        if !user.is_active {
            self.audit(
                AuthEvent::LoginFailure { reason: "Account disabled".into() },
                Some(&user),
                None,
                ip,
            );
            return Err(GameError::forbidden("Account disabled"));
        }

        if !self.hasher.verify(password, &user.password_hash)? {
            user.access_failed_count += 1;
            let locked_now = user.access_failed_count >= rules::MAX_FAILED_LOGINS;
            if locked_now {
                user.lockout_end = Some(now + Duration::minutes(rules::LOCKOUT_MINUTES));
                user.access_failed_count = 0;
            }
            tx.update_user(&user).await?;
            tx.commit().await?;

            if locked_now {
                warn!(user_id = user.id, "Account locked after repeated failed logins");
                self.audit(AuthEvent::LockedOut, Some(&user), None, ip);
            } else {
                self.audit(
                    AuthEvent::LoginFailure { reason: "Wrong password".into() },
                    Some(&user),
                    None,
                    ip,
                );
            }
            return Err(GameError::Unauthorized("Invalid credentials".into()));
        }

        user.access_failed_count = 0;
        user.lockout_end = None;
        user.last_login_at = Some(now);
        tx.update_user(&user).await?;
        let pending = self.open_session(tx.as_mut(), &user, now).await?;
        tx.commit().await?;

        self.audit(AuthEvent::LoginSuccess, Some(&user), None, ip);
        self.finish_session(pending, now)
    }

    /// Rotate a refresh token: the presented token is consumed and a new
    /// pair is returned.
    pub async fn refresh(&self, refresh_token: &str) -> GameResult<AuthTokens> {
        let now = self.ctx.clock.now();
        let hash = OpaqueToken::new(refresh_token).hash();
        let mut tx = self.ctx.store.begin().await?;

        let stored = tx
            .user_token_by_hash(TokenPurpose::Refresh, hash.as_str())
            .await?
            .filter(|t| hash.matches(&t.token_hash))
            .ok_or_else(|| GameError::Unauthorized("Invalid refresh token".into()))?;
        tx.delete_user_token(stored.id).await?;

        if stored.expires_at <= now {
            tx.commit().await?;
            return Err(GameError::Unauthorized("Refresh token expired".into()));
        }

        let user = tx
            .user_by_id(stored.user_id)
            .await?
            .ok_or_else(|| GameError::Unauthorized("Invalid refresh token".into()))?;
        if user.is_locked(now) {
            return Err(GameError::Locked);
        }
        if !user.is_active {
            return Err(GameError::forbidden("Account disabled"));
        }

        let pending = self.open_session(tx.as_mut(), &user, now).await?;
        tx.commit().await?;
        self.audit(AuthEvent::TokenRefreshed, Some(&user), None, None);
        self.finish_session(pending, now)
    }

    /// Revoke a refresh token. Unknown tokens are ignored.
    pub async fn logout(&self, refresh_token: &str) -> GameResult<()> {
        let hash = OpaqueToken::new(refresh_token).hash();
        let mut tx = self.ctx.store.begin().await?;
        if let Some(stored) = tx
            .user_token_by_hash(TokenPurpose::Refresh, hash.as_str())
            .await?
        {
            tx.delete_user_token(stored.id).await?;
            tx.commit().await?;
            self.audit.log_auth_event(
                AuthEvent::Logout,
                AuditSubject {
                    user_id: Some(stored.user_id),
                    ..Default::default()
                },
            );
        }
        Ok(())
    }

    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> GameResult<()> {
        validate_password(new_password)?;
        let mut tx = self.ctx.store.begin().await?;
        let mut user = tx
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| GameError::not_found("User"))?;
        if !self.hasher.verify(current_password, &user.password_hash)? {
            return Err(GameError::validation("Current password is incorrect"));
        }
        user.password_hash = self.hasher.hash(new_password)?;
        tx.update_user(&user).await?;
        tx.delete_user_tokens(user.id, TokenPurpose::Refresh).await?;
        tx.commit().await?;
        self.audit(AuthEvent::PasswordChanged, Some(&user), None, None);
        Ok(())
    }

    /// Queue a reset email when the address is known. The outcome is the
    /// same either way.
    pub async fn request_password_reset(&self, email: &str) -> GameResult<()> {
        let now = self.ctx.clock.now();
        let mut tx = self.ctx.store.begin().await?;
        let Some(user) = tx.user_by_email(email.trim()).await? else {
            return Ok(());
        };
        tx.delete_user_tokens(user.id, TokenPurpose::PasswordReset).await?;
        let (token, _) = Self::store_token(
            tx.as_mut(),
            user.id,
            TokenPurpose::PasswordReset,
            now,
            Duration::minutes(rules::PASSWORD_RESET_TTL_MINUTES),
        )
        .await?;
        Self::queue_email(
            tx.as_mut(),
            &user.email,
            "Reset your GameSpace password",
            format!(
                "Use this code to reset your password within {} minutes: {}",
                rules::PASSWORD_RESET_TTL_MINUTES,
                token.expose_secret()
            ),
            now,
        )
        .await?;
        tx.commit().await?;
        self.audit(AuthEvent::PasswordResetRequested, Some(&user), None, None);
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> GameResult<()> {
        validate_password(new_password)?;
        let now = self.ctx.clock.now();
        let hash = OpaqueToken::new(token).hash();
        let mut tx = self.ctx.store.begin().await?;
        let stored = tx
            .user_token_by_hash(TokenPurpose::PasswordReset, hash.as_str())
            .await?
            .filter(|t| t.expires_at > now)
            .ok_or_else(|| GameError::validation("Invalid or expired token"))?;
        let mut user = tx
            .user_by_id(stored.user_id)
            .await?
            .ok_or_else(|| GameError::validation("Invalid or expired token"))?;

        user.password_hash = self.hasher.hash(new_password)?;
        user.access_failed_count = 0;
        user.lockout_end = None;
        tx.update_user(&user).await?;
        tx.delete_user_tokens(user.id, TokenPurpose::PasswordReset).await?;
        tx.delete_user_tokens(user.id, TokenPurpose::Refresh).await?;
        tx.commit().await?;
        self.audit(AuthEvent::PasswordReset, Some(&user), None, None);
        Ok(())
    }

    pub async fn confirm_email(&self, user_id: i64, token: &str) -> GameResult<()> {
        let now = self.ctx.clock.now();
        let hash = OpaqueToken::new(token).hash();
        let mut tx = self.ctx.store.begin().await?;
        let stored = tx
            .user_token_by_hash(TokenPurpose::EmailConfirmation, hash.as_str())
            .await?
            .filter(|t| t.user_id == user_id && t.expires_at > now)
            .ok_or_else(|| GameError::validation("Invalid or expired token"))?;
        let mut user = tx
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| GameError::not_found("User"))?;
        user.email_confirmed = true;
        tx.update_user(&user).await?;
        tx.delete_user_token(stored.id).await?;
        tx.commit().await?;
        self.audit(AuthEvent::EmailConfirmed, Some(&user), None, None);
        Ok(())
    }

    /// Validate a bearer token and resolve the caller
    pub async fn authenticate(&self, bearer: &str) -> GameResult<AuthUser> {
        let now = self.ctx.clock.now();
        let claims = self.jwt.verify(bearer, now)?;
        let user_id = claims.user_id()?;

        let mut tx = self.ctx.store.begin().await?;
        let user = tx
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| GameError::Unauthorized("Unknown user".into()))?;
        drop(tx);

        if !user.is_active {
            return Err(GameError::forbidden("Account disabled"));
        }
        if user.is_locked(now) {
            return Err(GameError::Locked);
        }
        Ok(AuthUser {
            user_id: user.id,
            account: user.account,
        })
    }

    pub async fn profile(&self, user_id: i64) -> GameResult<UserProfile> {
        let mut tx = self.ctx.store.begin().await?;
        let user = tx
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| GameError::not_found("User"))?;
        let permissions = rbac::permissions_in(tx.as_mut(), user_id).await?;
        Ok(UserProfile::build(&user, permissions.into_iter().collect()))
    }

    pub async fn update_nickname(&self, user_id: i64, nickname: &str) -> GameResult<UserProfile> {
        let nickname = bounded_text("Nickname", nickname, 1, MAX_NICKNAME_CHARS)?;
        let mut tx = self.ctx.store.begin().await?;
        let mut user = tx
            .user_by_id(user_id)
            .await?
            .ok_or_else(|| GameError::not_found("User"))?;
        user.nickname = nickname.to_string();
        tx.update_user(&user).await?;
        let permissions = rbac::permissions_in(tx.as_mut(), user_id).await?;
        tx.commit().await?;
        Ok(UserProfile::build(&user, permissions.into_iter().collect()))
    }
}

struct PendingSession {
    refresh: OpaqueToken,
    refresh_expires_at: DateTime<Utc>,
    profile: UserProfile,
}
