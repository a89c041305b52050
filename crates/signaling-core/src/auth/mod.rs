//! Session verification for the HTTP surface
//!
//! Login lives elsewhere; requests arrive carrying an HS256 session token
//! either as `Authorization: Bearer <token>` or in the session cookie.

use axum::http::{header, HeaderMap};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AuthConfig;
use crate::error::{Result, SignalingError};
use crate::types::{Principal, UserId};

/// Claims carried by a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub iss: String,
    /// User id
    pub sub: String,
    pub username: String,
    pub display_name: String,
    pub exp: u64,
    pub iat: u64,
}

pub struct SessionVerifier {
    issuer: String,
    cookie_name: String,
    ttl_seconds: u64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    header: Header,
}

impl SessionVerifier {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let secret = config
            .session_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| SignalingError::config("Session secret is not set"))?;

        Ok(Self {
            issuer: config.issuer.clone(),
            cookie_name: config.cookie_name.clone(),
            ttl_seconds: config.session_ttl_seconds,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            header: Header::new(Algorithm::HS256),
        })
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Mint a session token, as the login service would
    pub fn issue_session_token(&self, principal: &Principal) -> Result<String> {
        let now = Utc::now();
        let exp = now + chrono::Duration::seconds(self.ttl_seconds as i64);

        let claims = SessionClaims {
            iss: self.issuer.clone(),
            sub: principal.id.to_string(),
            username: principal.username.clone(),
            display_name: principal.display_name.clone(),
            exp: exp.timestamp() as u64,
            iat: now.timestamp() as u64,
        };

        Ok(encode(&self.header, &claims, &self.encoding_key)?)
    }

    pub fn verify(&self, token: &str) -> Result<Principal> {
        let mut validation = Validation::new(self.header.alg);
        validation.set_issuer(&[self.issuer.clone()]);

        let claims = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| SignalingError::InvalidSession(e.to_string()))?
            .claims;

        Ok(Principal {
            id: UserId::from(claims.sub),
            username: claims.username,
            display_name: claims.display_name,
        })
    }

    /// Resolve the caller of a request. Bearer header wins over the cookie.
    pub fn principal_from_headers(&self, headers: &HeaderMap) -> Result<Principal> {
        let token = bearer_token(headers)
            .or_else(|| cookie_value(headers, &self.cookie_name))
            .ok_or(SignalingError::Unauthenticated)?;

        let principal = self.verify(token)?;
        debug!("🔐 Session verified for {}", principal.username);
        Ok(principal)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}
