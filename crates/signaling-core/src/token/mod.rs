//! Media grant issuance
//!
//! Grants are LiveKit access tokens: HS256 JWTs signed with the API secret,
//! `iss` set to the API key and `sub` to the participant identity, carrying a
//! `video` grant scoped to a single room.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::MediaConfig;
use crate::error::{Result, SignalingError};

/// Room permissions embedded in every grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    pub room: String,
    pub room_join: bool,
    pub can_publish: bool,
    pub can_subscribe: bool,
    pub can_publish_data: bool,
}

impl VideoGrant {
    /// Symmetric full-participant rights, used for both caller and callee
    pub fn participant(room: &str) -> Self {
        Self {
            room: room.to_string(),
            room_join: true,
            can_publish: true,
            can_subscribe: true,
            can_publish_data: true,
        }
    }
}

/// JWT claims understood by the media service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantClaims {
    pub iss: String,              // API key
    pub sub: String,              // Participant identity
    pub nbf: u64,                 // Not before
    pub exp: u64,                 // Expiration
    pub jti: String,              // JWT ID
    pub video: VideoGrant,
}

/// A signed, room-scoped media credential
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub room_name: String,
    pub identity: String,
    pub permissions: VideoGrant,
    /// Encoded JWT handed to the client
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Issues media grants. Holds no per-call state.
pub struct TokenIssuer {
    api_key: String,
    ttl_seconds: u64,
    keys: Option<SigningKeys>,
    header: Header,
}

impl TokenIssuer {
    /// Build an issuer from media settings.
    ///
    /// A missing secret is not an error here; every `issue` call reports it
    /// instead so the server can still start and serve presence.
    pub fn new(config: &MediaConfig) -> Self {
        let keys = config
            .api_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
            .map(|secret| SigningKeys {
                encoding: EncodingKey::from_secret(secret.as_bytes()),
                decoding: DecodingKey::from_secret(secret.as_bytes()),
            });

        Self {
            api_key: config.api_key.clone(),
            ttl_seconds: config.token_ttl_seconds,
            keys,
            header: Header::new(Algorithm::HS256),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.keys.is_some() && !self.api_key.is_empty()
    }

    /// Sign a grant that lets `identity` join, publish, subscribe and send
    /// data in `room_name`.
    pub fn issue(&self, room_name: &str, identity: &str) -> Result<Grant> {
        let keys = self.signing_keys()?;

        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(self.ttl_seconds as i64);
        let permissions = VideoGrant::participant(room_name);

        let claims = GrantClaims {
            iss: self.api_key.clone(),
            sub: identity.to_string(),
            nbf: now.timestamp() as u64,
            exp: expires_at.timestamp() as u64,
            jti: identity.to_string(),
            video: permissions.clone(),
        };

        let token = encode(&self.header, &claims, &keys.encoding)?;
        debug!("🎟️ Issued grant for {} in room {}", identity, room_name);

        Ok(Grant {
            room_name: room_name.to_string(),
            identity: identity.to_string(),
            permissions,
            token,
            expires_at,
        })
    }

    /// Decode and check a grant token issued with the same key pair
    pub fn verify(&self, token: &str) -> Result<GrantClaims> {
        let keys = self.signing_keys()?;

        let mut validation = Validation::new(self.header.alg);
        validation.set_issuer(&[self.api_key.clone()]);
        validation.validate_exp = true;
        validation.validate_nbf = true;

        let token_data = decode::<GrantClaims>(token, &keys.decoding, &validation)?;
        Ok(token_data.claims)
    }

    fn signing_keys(&self) -> Result<&SigningKeys> {
        if self.api_key.is_empty() {
            return Err(SignalingError::config("LiveKit API key is not set"));
        }
        self.keys
            .as_ref()
            .ok_or_else(|| SignalingError::config("LiveKit API secret is not set"))
    }
}
