// Copyright (c) 2025 - Cowboy AI, Inc.
//! Session tokens
//!
//! Compact `header.claims.signature` tokens, each segment base64url without
//! padding. The signature is HMAC-SHA256 over `header.claims` with a
//! process-lifetime secret. Only `HS256` is accepted; any other `alg`,
//! including `none`, is rejected before the signature is looked at.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// The only accepted signing algorithm
pub const ALGORITHM: &str = "HS256";

/// Length of a generated secret
pub const SECRET_LEN: usize = 24;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("unsupported signing algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    #[error("signature mismatch")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("invalid signing key")]
    InvalidKey,
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

/// Signed claim set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Username
    pub sub: String,
    pub privileges: Vec<String>,
    pub sessionuri: String,
    /// Issued at, seconds since the epoch
    pub iat: i64,
    /// Expiry, seconds since the epoch
    pub exp: i64,
}

impl SessionClaims {
    pub fn new<I, S>(
        username: impl Into<String>,
        privileges: I,
        session_uri: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sub: username.into(),
            privileges: privileges.into_iter().map(Into::into).collect(),
            sessionuri: session_uri.into(),
            iat: issued_at.timestamp(),
            exp: (issued_at + lifetime).timestamp(),
        }
    }
}

/// Mints and verifies tokens with one secret
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Fresh random secret; tokens do not survive the process
    pub fn generate() -> Self {
        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SECRET_LEN)
            .map(char::from)
            .collect();
        Self::from_secret(secret)
    }

    pub fn from_secret(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn mint(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some("JWT".to_string()),
        };
        let header = serde_json::to_vec(&header).map_err(|_| TokenError::Malformed)?;
        let claims = serde_json::to_vec(claims).map_err(|_| TokenError::Malformed)?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims)
        );
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{}.{}", signing_input, signature))
    }

    /// Check algorithm, signature and expiry, then return the claims
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
        if token.matches('.').count() != 2 {
            return Err(TokenError::Malformed);
        }
        let (signing_input, signature) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
        let (header, claims) = signing_input
            .split_once('.')
            .ok_or(TokenError::Malformed)?;

        let header: Header = decode_segment(header)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let claims: SessionClaims = decode_segment(claims)?;
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::InvalidKey)
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(now: DateTime<Utc>) -> SessionClaims {
        SessionClaims::new(
            "root",
            ["Login", "ConfigureManager"],
            "/redfish/v1/SessionService/Sessions/1",
            now,
            Duration::hours(24),
        )
    }

    #[test]
    fn test_round_trip() {
        let signer = TokenSigner::generate();
        let now = Utc::now();
        let token = signer.mint(&claims(now)).unwrap();

        assert_eq!(signer.verify(&token, now).unwrap(), claims(now));
    }

    #[test]
    fn test_other_secret_rejected() {
        let now = Utc::now();
        let token = TokenSigner::generate().mint(&claims(now)).unwrap();

        assert_eq!(
            TokenSigner::generate().verify(&token, now),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_alg_none_rejected() {
        let signer = TokenSigner::from_secret("secret");
        let now = Utc::now();
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims(now)).unwrap());

        let unsigned = format!("{}.{}.", header, body);
        assert_eq!(
            signer.verify(&unsigned, now),
            Err(TokenError::UnsupportedAlgorithm("none".to_string()))
        );
    }

    #[test]
    fn test_expired_rejected() {
        let signer = TokenSigner::from_secret("secret");
        let now = Utc::now();
        let token = signer.mint(&claims(now)).unwrap();

        assert_eq!(
            signer.verify(&token, now + Duration::hours(25)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        let signer = TokenSigner::from_secret("secret");
        assert_eq!(signer.verify("abc", Utc::now()), Err(TokenError::Malformed));
        assert_eq!(signer.verify("a.b.c.d", Utc::now()), Err(TokenError::Malformed));
    }

    #[test]
    fn test_generated_secret_length() {
        let a = TokenSigner::generate();
        assert_eq!(a.secret.len(), SECRET_LEN);
        assert!(format!("{:?}", a).contains("TokenSigner"));
    }
}
