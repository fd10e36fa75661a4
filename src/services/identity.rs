use crate::config::IdentityConfig;
use crate::error::UpstreamError;
use crate::services::{check_status, http_client, require};
use reqwest::blocking::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

const SERVICE: &str = "identity provider";

/// Fixed identity the offline stub hands out for tokens it did not issue.
pub const STUB_USER_ID: &str = "00000000-0000-4000-8000-000000000001";
pub const STUB_USER_EMAIL: &str = "test@example.com";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub id: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: IdentityUser,
}

/// Result of a sign-up. `session` is absent when the provider requires email confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUp {
    pub user: IdentityUser,
    pub session: Option<Session>,
}

pub trait IdentityProvider: Send + Sync {
    fn sign_up(&self, email: &str, password: &str) -> Result<SignUp, UpstreamError>;
    fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, UpstreamError>;
    fn refresh_session(&self, refresh_token: &str) -> Result<Session, UpstreamError>;
    fn get_user(&self, access_token: &str) -> Result<IdentityUser, UpstreamError>;
    fn sign_out(&self, access_token: &str) -> Result<(), UpstreamError>;
    /// Admin call, used to roll back a sign-up whose local user row could not be written.
    fn delete_user(&self, user_id: &str) -> Result<(), UpstreamError>;
}

/// GoTrue REST API (`/auth/v1/*`), as exposed by Supabase.
pub struct GoTrueIdentity {
    config: IdentityConfig,
}

impl GoTrueIdentity {
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }

    fn call(
        &self,
        method: reqwest::Method,
        path: &str,
        bearer: Option<&str>,
    ) -> Result<RequestBuilder, UpstreamError> {
        let anon = require(SERVICE, "SUPABASE_ANON_KEY", &self.config.anon_key)?;
        self.call_with_key(method, path, anon, bearer.unwrap_or(anon))
    }

    fn call_with_key(
        &self,
        method: reqwest::Method,
        path: &str,
        api_key: &str,
        bearer: &str,
    ) -> Result<RequestBuilder, UpstreamError> {
        let url = require(SERVICE, "SUPABASE_URL", &self.config.url)?;
        let client = http_client(SERVICE, Duration::from_secs(30))?;
        Ok(client
            .request(method, format!("{url}/auth/v1{path}"))
            .header("apikey", api_key)
            .bearer_auth(bearer))
    }

    fn json(builder: RequestBuilder) -> Result<Value, UpstreamError> {
        let response = builder
            .send()
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;
        check_status(SERVICE, response)?
            .json()
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, UpstreamError> {
    serde_json::from_value(body).map_err(|e| UpstreamError::InvalidResponse {
        service: SERVICE,
        message: e.to_string(),
    })
}

/// Sign-up answers with a session when auto-confirm is on, or with the bare user otherwise.
fn parse_sign_up(body: Value) -> Result<SignUp, UpstreamError> {
    if body.get("access_token").is_some() {
        let session: Session = decode(body)?;
        return Ok(SignUp {
            user: session.user.clone(),
            session: Some(session),
        });
    }
    let user = match body.get("user") {
        Some(user) => decode(user.clone())?,
        None => decode(body)?,
    };
    Ok(SignUp {
        user,
        session: None,
    })
}

impl IdentityProvider for GoTrueIdentity {
    fn sign_up(&self, email: &str, password: &str) -> Result<SignUp, UpstreamError> {
        let builder = self
            .call(reqwest::Method::POST, "/signup", None)?
            .json(&json!({ "email": email, "password": password }));
        parse_sign_up(Self::json(builder)?)
    }

    fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, UpstreamError> {
        let builder = self
            .call(reqwest::Method::POST, "/token?grant_type=password", None)?
            .json(&json!({ "email": email, "password": password }));
        decode(Self::json(builder)?)
    }

    fn refresh_session(&self, refresh_token: &str) -> Result<Session, UpstreamError> {
        let builder = self
            .call(reqwest::Method::POST, "/token?grant_type=refresh_token", None)?
            .json(&json!({ "refresh_token": refresh_token }));
        decode(Self::json(builder)?)
    }

    fn get_user(&self, access_token: &str) -> Result<IdentityUser, UpstreamError> {
        let builder = self.call(reqwest::Method::GET, "/user", Some(access_token))?;
        decode(Self::json(builder)?)
    }

    fn sign_out(&self, access_token: &str) -> Result<(), UpstreamError> {
        let response = self
            .call(reqwest::Method::POST, "/logout", Some(access_token))?
            .send()
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;
        check_status(SERVICE, response).map(|_| ())
    }

    fn delete_user(&self, user_id: &str) -> Result<(), UpstreamError> {
        let service_key = require(SERVICE, "SUPABASE_SERVICE_ROLE_KEY", &self.config.service_role_key)?;
        let response = self
            .call_with_key(
                reqwest::Method::DELETE,
                &format!("/admin/users/{user_id}"),
                service_key,
                service_key,
            )?
            .send()
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, e))?;
        check_status(SERVICE, response).map(|_| ())
    }
}

#[derive(Default)]
struct StubState {
    users_by_email: HashMap<String, IdentityUser>,
    access: HashMap<String, IdentityUser>,
    refresh: HashMap<String, IdentityUser>,
}

/// Offline identity provider: accepts any password, issues random tokens and resolves
/// tokens it never issued to a fixed test user.
#[derive(Default)]
pub struct StubIdentity {
    state: Mutex<StubState>,
}

impl StubIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StubState>, UpstreamError> {
        self.state.lock().map_err(|e| UpstreamError::Failed {
            service: SERVICE,
            message: e.to_string(),
        })
    }

    fn issue(state: &mut StubState, user: IdentityUser) -> Session {
        let session = Session {
            access_token: uuid::Uuid::new_v4().to_string(),
            refresh_token: uuid::Uuid::new_v4().to_string(),
            user,
        };
        state
            .access
            .insert(session.access_token.clone(), session.user.clone());
        state
            .refresh
            .insert(session.refresh_token.clone(), session.user.clone());
        session
    }

    fn user_for(state: &mut StubState, email: &str) -> IdentityUser {
        state
            .users_by_email
            .entry(email.to_string())
            .or_insert_with(|| IdentityUser {
                id: uuid::Uuid::new_v4().to_string(),
                email: email.to_string(),
            })
            .clone()
    }
}

impl IdentityProvider for StubIdentity {
    fn sign_up(&self, email: &str, _password: &str) -> Result<SignUp, UpstreamError> {
        let mut state = self.lock()?;
        let user = Self::user_for(&mut state, email);
        let session = Self::issue(&mut state, user.clone());
        Ok(SignUp {
            user,
            session: Some(session),
        })
    }

    fn sign_in_with_password(&self, email: &str, _password: &str) -> Result<Session, UpstreamError> {
        let mut state = self.lock()?;
        let user = Self::user_for(&mut state, email);
        Ok(Self::issue(&mut state, user))
    }

    fn refresh_session(&self, refresh_token: &str) -> Result<Session, UpstreamError> {
        let mut state = self.lock()?;
        let user = state
            .refresh
            .remove(refresh_token)
            .ok_or(UpstreamError::Status {
                service: SERVICE,
                status: 400,
                body: "Invalid Refresh Token".to_string(),
            })?;
        Ok(Self::issue(&mut state, user))
    }

    fn get_user(&self, access_token: &str) -> Result<IdentityUser, UpstreamError> {
        let state = self.lock()?;
        Ok(state
            .access
            .get(access_token)
            .cloned()
            .unwrap_or_else(|| IdentityUser {
                id: STUB_USER_ID.to_string(),
                email: STUB_USER_EMAIL.to_string(),
            }))
    }

    fn sign_out(&self, access_token: &str) -> Result<(), UpstreamError> {
        self.lock()?.access.remove(access_token);
        Ok(())
    }

    fn delete_user(&self, user_id: &str) -> Result<(), UpstreamError> {
        let mut state = self.lock()?;
        state.users_by_email.retain(|_, u| u.id != user_id);
        state.access.retain(|_, u| u.id != user_id);
        state.refresh.retain(|_, u| u.id != user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sign_up_with_session() {
        let body = json!({
            "access_token": "a", "refresh_token": "r", "token_type": "bearer",
            "user": {"id": "u1", "email": "cfo@example.com"}
        });
        let signed = parse_sign_up(body).unwrap();
        assert_eq!(signed.user.id, "u1");
        assert_eq!(signed.session.unwrap().access_token, "a");
    }

    #[test]
    fn sign_up_pending_confirmation() {
        let signed = parse_sign_up(json!({"id": "u2", "email": "x@example.com"})).unwrap();
        assert_eq!(signed.user.id, "u2");
        assert!(signed.session.is_none());
    }

    #[test]
    fn stub_round_trip() {
        let stub = StubIdentity::new();
        let signed = stub.sign_up("cfo@example.com", "pw").unwrap();
        let session = signed.session.unwrap();
        assert_eq!(stub.get_user(&session.access_token).unwrap(), signed.user);

        let again = stub.sign_in_with_password("cfo@example.com", "other").unwrap();
        assert_eq!(again.user.id, signed.user.id);

        let refreshed = stub.refresh_session(&session.refresh_token).unwrap();
        assert_eq!(refreshed.user.id, signed.user.id);
        assert!(stub.refresh_session(&session.refresh_token).is_err());
    }

    #[test]
    fn stub_resolves_unknown_tokens_to_test_user() {
        let user = StubIdentity::new().get_user("anything").unwrap();
        assert_eq!(user.id, STUB_USER_ID);
        assert_eq!(user.email, STUB_USER_EMAIL);
    }

    #[test]
    fn gotrue_without_url_is_not_configured() {
        let gotrue = GoTrueIdentity::new(IdentityConfig {
            url: None,
            anon_key: Some("anon".into()),
            service_role_key: None,
        });
        assert!(matches!(
            gotrue.get_user("t"),
            Err(UpstreamError::NotConfigured { missing: "SUPABASE_URL", .. })
        ));
    }
}
