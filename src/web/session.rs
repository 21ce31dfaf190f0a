use crate::db;
use crate::domain::models::UserRole;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap, StatusCode},
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct SessionClaims {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub role: UserRole,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid token format")]
    Invalid,
    #[error("signature mismatch")]
    Signature,
    #[error("expired")]
    Expired,
    #[error("bad role")]
    Role,
}

pub fn sign_session(
    user_id: Uuid,
    company_id: Uuid,
    role: &UserRole,
    key: &[u8],
) -> Result<String, SessionError> {
    let exp = Utc::now() + Duration::hours(24);
    let payload = format!(
        "{}|{}|{}|{}",
        user_id,
        company_id,
        role_string(role),
        exp.timestamp()
    );
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(payload.as_bytes());
    let sig = mac.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        general_purpose::STANDARD.encode(payload.as_bytes()),
        general_purpose::STANDARD.encode(sig)
    ))
}

pub fn verify_session(token: &str, key: &[u8]) -> Result<SessionClaims, SessionError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 2 {
        return Err(SessionError::Invalid);
    }
    let payload_bytes = general_purpose::STANDARD
        .decode(parts[0])
        .map_err(|_| SessionError::Invalid)?;
    let sig_bytes = general_purpose::STANDARD
        .decode(parts[1])
        .map_err(|_| SessionError::Invalid)?;

    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(&payload_bytes);
    mac.verify_slice(&sig_bytes)
        .map_err(|_| SessionError::Signature)?;

    let payload = String::from_utf8(payload_bytes).map_err(|_| SessionError::Invalid)?;
    let pieces: Vec<&str> = payload.split('|').collect();
    if pieces.len() != 4 {
        return Err(SessionError::Invalid);
    }
    let user_id = Uuid::parse_str(pieces[0]).map_err(|_| SessionError::Invalid)?;
    let company_id = Uuid::parse_str(pieces[1]).map_err(|_| SessionError::Invalid)?;
    let role = parse_role(pieces[2])?;
    let exp: i64 = pieces[3].parse().map_err(|_| SessionError::Invalid)?;
    if Utc::now().timestamp() > exp {
        return Err(SessionError::Expired);
    }
    Ok(SessionClaims {
        user_id,
        company_id,
        role,
        exp,
    })
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(val) = auth.to_str() {
            if let Some(bearer) = val.strip_prefix("Bearer ") {
                return Some(bearer.trim().to_string());
            }
        }
    }
    if let Some(cookie) = headers.get(axum::http::header::COOKIE) {
        if let Ok(val) = cookie.to_str() {
            for pair in val.split(';') {
                if let Some(rest) = pair.trim().strip_prefix("session=") {
                    return Some(rest.to_string());
                }
            }
        }
    }
    None
}

fn role_string(role: &UserRole) -> &'static str {
    match role {
        UserRole::HrAdmin => "HR_ADMIN",
        UserRole::Employee => "EMPLOYEE",
    }
}

fn parse_role(raw: &str) -> Result<UserRole, SessionError> {
    match raw {
        "HR_ADMIN" => Ok(UserRole::HrAdmin),
        "EMPLOYEE" => Ok(UserRole::Employee),
        _ => Err(SessionError::Role),
    }
}

/// Authenticated company-scoped caller.
pub struct UserSession(pub SessionClaims);

/// Same, but the caller must be an HR admin.
pub struct AdminSession(pub SessionClaims);

#[async_trait]
impl<S> FromRequestParts<S> for UserSession
where
    S: Send + Sync,
    crate::state::SharedState: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let shared = crate::state::SharedState::from_ref(state);

        let token = extract_token(&parts.headers).ok_or(StatusCode::UNAUTHORIZED)?;
        let claims = verify_session(&token, &shared.config.session_key).map_err(|e| {
            tracing::warn!("session verification failed: {}", e);
            StatusCode::UNAUTHORIZED
        })?;

        // The user must still exist; deleted employees lose access at once.
        let user = db::find_user_by_id(&shared.pool, claims.user_id)
            .await
            .map_err(|_| StatusCode::UNAUTHORIZED)?;
        if user.is_none() {
            return Err(StatusCode::UNAUTHORIZED);
        }

        Ok(UserSession(claims))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminSession
where
    S: Send + Sync,
    crate::state::SharedState: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let UserSession(claims) = UserSession::from_request_parts(parts, state).await?;
        if claims.role != UserRole::HrAdmin {
            return Err(StatusCode::FORBIDDEN);
        }
        Ok(AdminSession(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let key = b"test-session-key";
        let user_id = Uuid::new_v4();
        let company_id = Uuid::new_v4();
        let token = sign_session(user_id, company_id, &UserRole::HrAdmin, key).unwrap();
        let claims = verify_session(&token, key).unwrap();
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.company_id, company_id);
        assert_eq!(claims.role, UserRole::HrAdmin);
    }

    #[test]
    fn wrong_key_fails_verification() {
        let token =
            sign_session(Uuid::new_v4(), Uuid::new_v4(), &UserRole::Employee, b"key-one-1234")
                .unwrap();
        assert!(matches!(
            verify_session(&token, b"key-two-5678"),
            Err(SessionError::Signature)
        ));
    }

    #[test]
    fn tampered_payload_fails() {
        let key = b"test-session-key";
        let token =
            sign_session(Uuid::new_v4(), Uuid::new_v4(), &UserRole::Employee, key).unwrap();
        let mut parts: Vec<String> = token.split('.').map(String::from).collect();
        parts[0] = general_purpose::STANDARD.encode(b"forged|payload|EMPLOYEE|99999999999");
        let forged = parts.join(".");
        assert!(verify_session(&forged, key).is_err());
    }

    #[test]
    fn bearer_and_cookie_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer abc.def".parse().unwrap(),
        );
        assert_eq!(extract_token(&headers), Some("abc.def".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            "theme=dark; session=xyz.123".parse().unwrap(),
        );
        assert_eq!(extract_token(&headers), Some("xyz.123".to_string()));
    }
}
