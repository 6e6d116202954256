//! Session identity.
//!
//! The identity is read from the bearer token payload without verifying
//! its signature. It drives what the UI offers (dashboards, menus) and is
//! never used to grant access: the backend checks the token on every
//! request.

use crate::storage::{KeyValueStore, ROLE_KEY, TOKEN_KEY, USER_ID_KEY, USER_NAME_KEY};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Token is not a JWT")]
    Malformed,

    #[error("Token payload is not base64 {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Token payload is not valid {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Guide,
    Admin,
}

impl Role {
    /// Unknown roles get the least privileged affordances.
    pub fn parse(role: &str) -> Self {
        match role.trim().to_ascii_lowercase().as_str() {
            "guide" => Role::Guide,
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::Admin => "admin",
        }
    }

    pub fn dashboard(&self) -> &'static str {
        match self {
            Role::User => "/user/dashboard",
            Role::Guide => "/guide/dashboard",
            Role::Admin => "/admin/dashboard",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(alias = "_id", alias = "userId")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    exp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: Option<String>,
    pub role: Role,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            id: claims.id,
            name: claims.name,
            role: claims.role.as_deref().map(Role::parse).unwrap_or_default(),
            issued_at: claims.iat.and_then(|secs| DateTime::from_timestamp(secs, 0)),
            expires_at: claims.exp.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        }
    }
}

pub fn decode_token(token: &str) -> Result<Identity, SessionError> {
    let mut parts = token.trim().split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(SessionError::Malformed),
    };
    let bytes = general_purpose::URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let claims: Claims = serde_json::from_slice(&bytes)?;
    Ok(claims.into())
}

pub type Subscription = usize;

type Listener = Rc<dyn Fn(Option<&Identity>)>;

#[derive(Default)]
struct Inner {
    identity: Option<Identity>,
    listeners: Vec<(Subscription, Listener)>,
    next: Subscription,
}

/// Process-wide session, provided once at startup.
#[derive(Clone)]
pub struct Session {
    inner: Rc<RefCell<Inner>>,
    store: Rc<dyn KeyValueStore>,
}

impl Session {
    /// Builds the session from whatever token storage holds.
    pub fn restore(store: Rc<dyn KeyValueStore>) -> Self {
        let session = Session {
            inner: Rc::new(RefCell::new(Inner::default())),
            store,
        };
        session.reload();
        session
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.borrow().identity.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.store.get(TOKEN_KEY)
    }

    /// Re-reads the stored token, e.g. after another tab changed it.
    /// Listeners only hear about actual identity changes.
    pub fn reload(&self) {
        let identity = match self.store.get(TOKEN_KEY) {
            Some(token) => match decode_token(&token) {
                Ok(identity) => Some(identity),
                Err(err) => {
                    leptos::logging::warn!("Discarding stored token: {err}");
                    self.clear_storage();
                    None
                }
            },
            None => None,
        };
        self.replace(identity);
    }

    pub fn sign_in(&self, token: &str) -> Result<Identity, SessionError> {
        let identity = decode_token(token)?;
        self.store.set(TOKEN_KEY, token);
        self.store.set(USER_ID_KEY, &identity.id);
        match &identity.name {
            Some(name) => self.store.set(USER_NAME_KEY, name),
            None => self.store.remove(USER_NAME_KEY),
        }
        self.store.set(ROLE_KEY, identity.role.as_str());
        self.replace(Some(identity.clone()));
        Ok(identity)
    }

    pub fn sign_out(&self) {
        self.clear_storage();
        self.replace(None);
    }

    pub fn subscribe(&self, listener: impl Fn(Option<&Identity>) + 'static) -> Subscription {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next;
        inner.next += 1;
        inner.listeners.push((id, Rc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.inner
            .borrow_mut()
            .listeners
            .retain(|(id, _)| *id != subscription);
    }

    fn clear_storage(&self) {
        for key in [TOKEN_KEY, USER_ID_KEY, USER_NAME_KEY, ROLE_KEY] {
            self.store.remove(key);
        }
    }

    fn replace(&self, identity: Option<Identity>) {
        let listeners: Vec<Listener> = {
            let mut inner = self.inner.borrow_mut();
            if inner.identity == identity {
                return;
            }
            inner.identity = identity.clone();
            inner
                .listeners
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect()
        };
        for listener in listeners {
            listener(identity.as_ref());
        }
    }
}

#[cfg(test)]
pub(crate) fn test_token(payload: serde_json::Value) -> String {
    let payload = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.{payload}.signature")
}
