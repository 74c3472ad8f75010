//! Session token authentication extractor.
//!
//! Tokens are issued by `apiflow token` and presented as
//! `Authorization: Bearer <token>`. A token reads
//! `<user-id>.<expiry-unix-seconds>.<signature>` where the signature is the
//! base64url HMAC-SHA256 of the first two parts under `HMAC_SECRET`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use apiflow_core::repository::WorkspaceRepository;
use apiflow_infra::sqlite::Owned;
use apiflow_types::id::{UserId, WorkspaceId};

use crate::http::error::AppError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Why a presented token was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("bad token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
}

/// Signs and verifies session tokens with the server's HMAC secret.
pub struct TokenSigner {
    mac: HmacSha256,
}

impl TokenSigner {
    pub fn new(secret: &SecretString) -> Result<Self, hmac::digest::InvalidLength> {
        let mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())?;
        Ok(Self { mac })
    }

    fn signature(&self, payload: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac
    }

    /// A token for `user_id` valid for `ttl`.
    pub fn issue(&self, user_id: &UserId, ttl: Duration) -> String {
        let expires = (Utc::now() + ttl).timestamp();
        let payload = format!("{user_id}.{expires}");
        let sig = self.signature(&payload).finalize().into_bytes();
        format!("{payload}.{}", URL_SAFE_NO_PAD.encode(sig))
    }

    /// The user a token was issued to, if the signature holds and the
    /// token has not expired at `now`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<UserId, TokenError> {
        let (payload, sig) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
        let sig = URL_SAFE_NO_PAD.decode(sig).map_err(|_| TokenError::Malformed)?;
        self.signature(payload)
            .verify_slice(&sig)
            .map_err(|_| TokenError::BadSignature)?;

        let (user, expires) = payload.split_once('.').ok_or(TokenError::Malformed)?;
        let expires: i64 = expires.parse().map_err(|_| TokenError::Malformed)?;
        if expires <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        user.parse::<UserId>().map_err(|_| TokenError::Malformed)
    }
}

/// The caller, resolved from a valid session token.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated {
    pub user_id: UserId,
}

impl Authenticated {
    /// Resolve the workspace owning `owned` and check the caller belongs
    /// to it. Run this before touching the row.
    pub async fn require(&self, state: &AppState, owned: Owned) -> Result<WorkspaceId, AppError> {
        let workspace_id = state.ownership.workspace_of(owned).await?;
        state
            .workspace_service
            .ensure_member(&workspace_id, &self.user_id)
            .await?;
        Ok(workspace_id)
    }

    /// Like [`Authenticated::require`] but only owners pass.
    pub async fn require_owner(&self, state: &AppState, workspace_id: &WorkspaceId) -> Result<(), AppError> {
        state
            .workspace_service
            .ensure_owner(workspace_id, &self.user_id)
            .await?;
        Ok(())
    }
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)?;
        let user_id = state
            .tokens
            .verify(&token, Utc::now())
            .map_err(|e| AppError::Unauthorized(e.to_string()))?;

        match state.workspace_service.repo().get_user(&user_id).await? {
            Some(_) => Ok(Authenticated { user_id }),
            None => Err(AppError::Unauthorized("unknown user".to_string())),
        }
    }
}

fn extract_token(parts: &Parts) -> Result<String, AppError> {
    let Some(auth) = parts.headers.get("authorization") else {
        return Err(AppError::Unauthorized(
            "Missing token. Provide it via 'Authorization: Bearer <token>'.".to_string(),
        ));
    };
    let auth = auth
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header encoding".to_string()))?;
    match auth.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(AppError::Unauthorized(
            "Authorization header must use the Bearer scheme".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(secret: &str) -> TokenSigner {
        TokenSigner::new(&SecretString::from(secret.to_string())).unwrap()
    }

    #[test]
    fn issued_tokens_verify() {
        let s = signer("k1");
        let user = UserId::new();
        let token = s.issue(&user, Duration::hours(1));
        assert_eq!(s.verify(&token, Utc::now()).unwrap(), user);
    }

    #[test]
    fn other_secret_or_tampering_is_rejected() {
        let user = UserId::new();
        let token = signer("k1").issue(&user, Duration::hours(1));
        assert_eq!(signer("k2").verify(&token, Utc::now()), Err(TokenError::BadSignature));

        let other = UserId::new();
        let forged = token.replacen(&user.to_string(), &other.to_string(), 1);
        assert_eq!(signer("k1").verify(&forged, Utc::now()), Err(TokenError::BadSignature));
    }

    #[test]
    fn expiry_is_enforced() {
        let s = signer("k1");
        let token = s.issue(&UserId::new(), Duration::minutes(5));
        let later = Utc::now() + Duration::minutes(10);
        assert_eq!(s.verify(&token, later), Err(TokenError::Expired));
    }

    #[test]
    fn garbage_is_malformed() {
        let s = signer("k1");
        assert_eq!(s.verify("nope", Utc::now()), Err(TokenError::Malformed));
        assert_eq!(s.verify("a.b.!!!", Utc::now()), Err(TokenError::Malformed));
    }
}
