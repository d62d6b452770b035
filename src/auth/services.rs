use std::time::Duration;

use anyhow::Context;
use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use regex::Regex;
use time::Duration as TimeDuration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::dto::Claims;
use super::repo_types::{Role, SessionRecord, SESSION_SCHEMA_VERSION};
use crate::config::JwtConfig;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn session_key(session_id: Uuid) -> String {
    format!("currentUser:{}", session_id)
}

/// HS256 signing material derived from config.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            ttl: Duration::from_secs((ttl_minutes.max(1) as u64) * 60),
        }
    }
}

impl JwtKeys {
    pub fn sign(&self, record: &SessionRecord, now: time::OffsetDateTime) -> anyhow::Result<String> {
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: record.user.id,
            sid: record.session_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %record.user.id, session_id = %record.session_id, "jwt signed");
        Ok(token)
    }

    /// Expiry is judged against `now` rather than the system clock.
    pub fn verify(&self, token: &str, now: time::OffsetDateTime) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.validate_exp = false;
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        if (data.claims.exp as i64) <= now.unix_timestamp() {
            anyhow::bail!("token expired");
        }
        Ok(data.claims)
    }
}

/// Looks the user up by email and opens a session. The password is not checked.
pub async fn login(st: &AppState, email: &str, _password: &str) -> AppResult<(String, SessionRecord)> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::Validation("Invalid email".into()));
    }

    let Some(user) = st.directory.find_by_email(&email) else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::AuthFailure);
    };

    let now = st.clock.now_utc();
    let record = SessionRecord::new(user.clone(), now);
    persist(st, &record).await?;

    let token = JwtKeys::from_ref(st).sign(&record, now)?;
    info!(user_id = %record.user.id, session_id = %record.session_id, "user logged in");
    Ok((token, record))
}

pub async fn logout(st: &AppState, record: &SessionRecord) -> AppResult<()> {
    st.kv
        .delete(&session_key(record.session_id))
        .await
        .context("delete session record")?;
    info!(user_id = %record.user.id, session_id = %record.session_id, "user logged out");
    Ok(())
}

/// Local simulation only: rewrites the role on this session's user copy.
pub async fn switch_role(st: &AppState, mut record: SessionRecord, role: Role) -> AppResult<SessionRecord> {
    if !st.config.school.role_switch_enabled {
        return Err(AppError::Forbidden("role switching is disabled".into()));
    }
    let previous = record.user.role;
    record.user.role = role;
    record.updated_at = st.clock.now_utc();
    persist(st, &record).await?;
    info!(user_id = %record.user.id, from = %previous, to = %role, "role switched");
    Ok(record)
}

/// Resolves a session id to its record. Missing, unreadable or
/// other-version records all count as no session.
pub async fn load_session(st: &AppState, session_id: Uuid) -> AppResult<Option<SessionRecord>> {
    let raw = st
        .kv
        .get(&session_key(session_id))
        .await
        .context("load session record")?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    match serde_json::from_value::<SessionRecord>(raw) {
        Ok(r) if r.version == SESSION_SCHEMA_VERSION => Ok(Some(r)),
        Ok(r) => {
            warn!(%session_id, version = r.version, "ignoring session record with foreign schema version");
            Ok(None)
        }
        Err(e) => {
            warn!(%session_id, error = %e, "ignoring unreadable session record");
            Ok(None)
        }
    }
}

async fn persist(st: &AppState, record: &SessionRecord) -> AppResult<()> {
    let value = serde_json::to_value(record).context("serialize session record")?;
    st.kv
        .put(&session_key(record.session_id), value)
        .await
        .context("persist session record")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::directory::ALEX_ID;
    use crate::clock::Clock;
    use serde_json::json;

    #[test]
    fn email_shape() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a b@c.d"));
    }

    #[tokio::test]
    async fn login_persists_and_signs() {
        let st = AppState::fake();
        let (token, record) = login(&st, "  ALEX.student@school.edu ", "ignored").await.unwrap();
        assert_eq!(record.user.id, ALEX_ID);

        let claims = JwtKeys::from_ref(&st).verify(&token, st.clock.now_utc()).unwrap();
        assert_eq!(claims.sub, ALEX_ID);
        assert_eq!(claims.sid, record.session_id);

        let loaded = load_session(&st, record.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.user.email, "alex.student@school.edu");
    }

    #[tokio::test]
    async fn token_expires_on_app_clock() {
        let (st, clock) = AppState::fake_with_clock();
        let (token, _) = login(&st, "alex.student@school.edu", "").await.unwrap();
        let keys = JwtKeys::from_ref(&st);
        assert!(keys.verify(&token, clock.now_utc()).is_ok());
        clock.advance(TimeDuration::minutes(6));
        assert!(keys.verify(&token, clock.now_utc()).is_err());
    }

    #[tokio::test]
    async fn unknown_email_is_auth_failure() {
        let st = AppState::fake();
        let err = login(&st, "ghost@school.edu", "x").await.unwrap_err();
        assert!(matches!(err, AppError::AuthFailure));
        let err = login(&st, "nonsense", "x").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn logout_removes_record() {
        let st = AppState::fake();
        let (_, record) = login(&st, "sarah.teacher@school.edu", "").await.unwrap();
        logout(&st, &record).await.unwrap();
        assert!(load_session(&st, record.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn switch_role_repersists() {
        let st = AppState::fake();
        let (_, record) = login(&st, "alex.student@school.edu", "").await.unwrap();
        let switched = switch_role(&st, record.clone(), Role::Teacher).await.unwrap();
        assert_eq!(switched.user.role, Role::Teacher);
        let loaded = load_session(&st, record.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.user.role, Role::Teacher);
    }

    #[tokio::test]
    async fn switch_role_can_be_disabled() {
        let mut st = AppState::fake();
        let mut cfg = (*st.config).clone();
        cfg.school.role_switch_enabled = false;
        st.config = std::sync::Arc::new(cfg);
        let (_, record) = login(&st, "alex.student@school.edu", "").await.unwrap();
        let err = switch_role(&st, record, Role::Admin).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn foreign_version_is_ignored() {
        let st = AppState::fake();
        let (_, record) = login(&st, "alex.student@school.edu", "").await.unwrap();
        let mut raw = serde_json::to_value(&record).unwrap();
        raw["version"] = json!(SESSION_SCHEMA_VERSION + 1);
        st.kv.put(&session_key(record.session_id), raw).await.unwrap();
        assert!(load_session(&st, record.session_id).await.unwrap().is_none());

        st.kv.put(&session_key(record.session_id), json!({"garbage": true})).await.unwrap();
        assert!(load_session(&st, record.session_id).await.unwrap().is_none());
    }
}
