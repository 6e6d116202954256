use crate::api::{self, ApiClient};
use crate::error::{server_message, ApiError};
use crate::state::{Identity, Session};
use reqwest::Method;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Serialize)]
struct LoginArgs<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupArgs {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    /// `user` or `guide`; admins are not created from the client.
    pub role: String,
}

fn token_of(body: &Value) -> Option<&str> {
    body.get("token")
        .or_else(|| body.get("accessToken"))
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
}

fn acknowledgement(body: &Value, fallback: &str) -> String {
    server_message(body).unwrap_or_else(|| fallback.to_owned())
}

/// Signs in the session from a successful login response.
pub fn sign_in_from(session: &Session, body: &Value) -> Result<Identity, ApiError> {
    let token = token_of(body)
        .ok_or_else(|| ApiError::Unexpected("login response has no token".into()))?;
    Ok(session.sign_in(token)?)
}

pub async fn login(
    api: &ApiClient,
    session: &Session,
    email: &str,
    password: &str,
) -> Result<Identity, ApiError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(ApiError::Invalid("Email and password are required".into()));
    }
    let request = api.public(Method::POST, &["auth", "login"])?.json(&LoginArgs {
        email: email.trim(),
        password,
    });
    let body = api::send(request).await?.into_result("Login failed")?;
    sign_in_from(session, &body)
}

pub async fn signup(api: &ApiClient, args: &SignupArgs) -> Result<String, ApiError> {
    if !matches!(args.role.as_str(), "user" | "guide") {
        return Err(ApiError::Invalid(format!("Cannot sign up as {}", args.role)));
    }
    let request = api.public(Method::POST, &["auth", "signup"])?.json(args);
    let body = api::send(request).await?.into_result("Signup failed")?;
    Ok(acknowledgement(&body, "Check your email to verify your account"))
}

pub async fn forgot_password(api: &ApiClient, email: &str) -> Result<String, ApiError> {
    let request = api
        .public(Method::POST, &["auth", "forgot-password"])?
        .json(&json!({ "email": email.trim() }));
    let body = api::send(request)
        .await?
        .into_result("Could not send reset email")?;
    Ok(acknowledgement(&body, "Password reset email sent"))
}

/// Confirms the emailed code. Backends that answer with a token sign the
/// user in directly.
pub async fn verify_email(
    api: &ApiClient,
    session: &Session,
    email: &str,
    otp: &str,
) -> Result<Option<Identity>, ApiError> {
    let request = api
        .public(Method::POST, &["auth", "verify-email"])?
        .json(&json!({ "email": email.trim(), "otp": otp.trim() }));
    let body = api::send(request).await?.into_result("Verification failed")?;
    match token_of(&body) {
        Some(_) => sign_in_from(session, &body).map(Some),
        None => Ok(None),
    }
}

pub async fn reset_password(
    api: &ApiClient,
    reset_token: &str,
    password: &str,
) -> Result<String, ApiError> {
    if password.len() < 6 {
        return Err(ApiError::Invalid(
            "Password must be at least 6 characters".into(),
        ));
    }
    let request = api
        .public(Method::POST, &["auth", "reset-password", reset_token])?
        .json(&json!({ "password": password }));
    let body = api::send(request)
        .await?
        .into_result("Could not reset password")?;
    Ok(acknowledgement(&body, "Password updated"))
}

pub fn logout(session: &Session) {
    session.sign_out();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{test_token, Role};
    use crate::storage::{KeyValueStore, MemoryStore, TOKEN_KEY};
    use std::rc::Rc;

    #[test]
    fn login_response_signs_in() {
        let store = Rc::new(MemoryStore::default());
        let session = Session::restore(store.clone());
        let token = test_token(json!({"id": "g1", "role": "guide"}));
        let identity = sign_in_from(&session, &json!({"token": token.clone(), "message": "ok"})).unwrap();
        assert_eq!(identity.role, Role::Guide);
        assert_eq!(store.get(TOKEN_KEY), Some(token));

        logout(&session);
        assert_eq!(session.identity(), None);
    }

    #[test]
    fn login_response_without_token() {
        let session = Session::restore(Rc::new(MemoryStore::default()));
        let err = sign_in_from(&session, &json!({"message": "ok"})).unwrap_err();
        assert!(matches!(err, ApiError::Unexpected(_)));
        let err = sign_in_from(&session, &json!({"token": "not-a-jwt"})).unwrap_err();
        assert!(matches!(err, ApiError::Session(_)));
    }

    #[test]
    fn acknowledgement_falls_back() {
        assert_eq!(acknowledgement(&json!({"message": "Sent"}), "x"), "Sent");
        assert_eq!(acknowledgement(&Value::Null, "x"), "x");
    }
}
