//! Bearer token verification.
//!
//! # Responsibilities
//! - Extract the bearer token from the `Authorization` header
//! - Verify the token and decode its claims
//! - Check the caller holds at least one of the required roles
//!
//! # Design Decisions
//! - Bad or missing token is 401, valid token without a matching role is 403
//! - The verifier is a trait so deployments can plug in their own identity
//!   provider; `JwtVerifier` covers the HS256 case

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderMap, StatusCode};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::RouteError;

/// The caller, as established by a verifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    pub roles: Vec<String>,
}

impl Identity {
    pub fn has_any_role(&self, roles: &[String]) -> bool {
        roles.iter().any(|r| self.roles.contains(r))
    }
}

/// Verifies the token carried by a request against a set of roles.
pub trait AuthorizationVerifier: Send + Sync {
    /// Succeeds when the request carries a valid token holding at least one
    /// of `required_roles`.
    fn verify(&self, headers: &HeaderMap, required_roles: &[String]) -> Result<Identity, RouteError>;
}

/// Token claims understood by [`JwtVerifier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: u64,
}

impl Claims {
    /// Claims for `sub` expiring `ttl_secs` from now.
    pub fn new<I, S>(sub: impl Into<String>, roles: I, ttl_secs: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            sub: sub.into(),
            roles: roles.into_iter().map(Into::into).collect(),
            exp: now + ttl_secs,
        }
    }
}

/// HS256 JSON Web Token verifier.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret),
            encoding: EncodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// `None` when no secret is configured.
    pub fn from_config(config: &AuthConfig) -> Option<Self> {
        config.jwt_secret.as_ref().map(|secret| {
            let mut verifier = Self::from_secret(secret.as_bytes());
            verifier.validation.leeway = config.leeway_secs;
            verifier
        })
    }

    /// Sign `claims` with this verifier's secret.
    pub fn issue(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
    }
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("leeway", &self.validation.leeway)
            .finish_non_exhaustive()
    }
}

impl AuthorizationVerifier for JwtVerifier {
    fn verify(&self, headers: &HeaderMap, required_roles: &[String]) -> Result<Identity, RouteError> {
        let token = bearer_token(headers).ok_or_else(|| {
            RouteError::authorization(StatusCode::UNAUTHORIZED, "Missing bearer token")
        })?;

        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| {
                RouteError::authorization(StatusCode::UNAUTHORIZED, format!("Invalid token: {e}"))
            })?
            .claims;

        let identity = Identity {
            subject: claims.sub,
            roles: claims.roles,
        };

        if !required_roles.is_empty() && !identity.has_any_role(required_roles) {
            return Err(RouteError::authorization(
                StatusCode::FORBIDDEN,
                format!(
                    "Token lacks required role (one of: {})",
                    required_roles.join(", ")
                ),
            ));
        }

        Ok(identity)
    }
}

/// The token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
