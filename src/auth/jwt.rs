// auth/jwt.rs — HS256 access tokens.
//
// Token format: base64url(header).base64url(claims).base64url(hmac-sha256)
// Claims carry `sub` (user id), `iat`, and `exp`.  Verification accepts the
// user id from `sub`, `userId`, or `user_id` — upstream token issuers have
// used all three spellings.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,
    #[error("Could not validate credentials - invalid token")]
    Invalid,
    #[error("Could not validate credentials - no user ID found in token")]
    MissingSubject,
}

fn mac(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length; this cannot fail.
    HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length")
}

/// Mint a signed access token for `user_id`, valid for `ttl_hours`.
pub fn sign(user_id: &str, secret: &str, ttl_hours: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let now = Utc::now().timestamp();
    let claims = json!({
        "sub": user_id,
        "iat": now,
        "exp": now + ttl_hours * 3600,
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

    let mut m = mac(secret);
    m.update(header.as_bytes());
    m.update(b".");
    m.update(payload.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(m.finalize().into_bytes());

    format!("{header}.{payload}.{signature}")
}

/// Verify a token's signature and expiry, returning the user id it carries.
pub fn verify(token: &str, secret: &str) -> Result<String, TokenError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Invalid);
    };

    let sig_bytes = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenError::Invalid)?;

    let mut m = mac(secret);
    m.update(header.as_bytes());
    m.update(b".");
    m.update(payload.as_bytes());
    // Constant-time comparison — the Mac trait handles it.
    m.verify_slice(&sig_bytes).map_err(|_| TokenError::Invalid)?;

    let claims: Value = URL_SAFE_NO_PAD
        .decode(payload)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or(TokenError::Invalid)?;

    if let Some(exp) = claims.get("exp").and_then(Value::as_i64) {
        if Utc::now().timestamp() >= exp {
            return Err(TokenError::Expired);
        }
    }

    extract_user_id(&claims).ok_or(TokenError::MissingSubject)
}

fn extract_user_id(claims: &Value) -> Option<String> {
    for key in ["sub", "userId", "user_id"] {
        match claims.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}
