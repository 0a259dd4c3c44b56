//! Stateless access tokens: `{user_id}.{expires_unix}.{hex(hmac_sha256)}`.
//!
//! The MAC covers `{user_id}.{expires_unix}` so neither part can be edited
//! without the server secret. Revocation is by rotating the secret or by
//! deleting the user (the gateway re-loads the user on every request).

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Result, UserError};

type HmacSha256 = Hmac<Sha256>;

/// Claims recovered from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: String,
    pub expires_at: i64,
}

pub struct TokenSigner {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl_secs: ttl_secs as i64,
        }
    }

    /// Issue a token for `user_id` valid from `now` for the configured TTL.
    pub fn issue_at(&self, user_id: &str, now: i64) -> Result<String> {
        let expires_at = now + self.ttl_secs;
        let body = format!("{user_id}.{expires_at}");
        let sig = self.mac(&body)?.finalize().into_bytes();
        Ok(format!("{body}.{}", hex::encode(sig)))
    }

    pub fn issue(&self, user_id: &str) -> Result<String> {
        self.issue_at(user_id, chrono::Utc::now().timestamp())
    }

    /// Verify signature and expiry as of `now`.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<TokenClaims> {
        let mut parts = token.rsplitn(3, '.');
        let (Some(sig_hex), Some(exp_str), Some(user_id)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(UserError::InvalidToken("expected three segments".to_string()));
        };
        if user_id.is_empty() {
            return Err(UserError::InvalidToken("empty subject".to_string()));
        }

        let expected = hex::decode(sig_hex)
            .map_err(|_| UserError::InvalidToken("signature is not valid hex".to_string()))?;
        let mac = self.mac(&format!("{user_id}.{exp_str}"))?;
        mac.verify_slice(&expected)
            .map_err(|_| UserError::InvalidToken("signature mismatch".to_string()))?;

        let expires_at: i64 = exp_str
            .parse()
            .map_err(|_| UserError::InvalidToken("bad expiry".to_string()))?;
        if expires_at <= now {
            return Err(UserError::TokenExpired);
        }

        Ok(TokenClaims {
            user_id: user_id.to_string(),
            expires_at,
        })
    }

    pub fn verify(&self, token: &str) -> Result<TokenClaims> {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }

    fn mac(&self, body: &str) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| UserError::InvalidToken("invalid HMAC key length".to_string()))?;
        mac.update(body.as_bytes());
        Ok(mac)
    }
}
