//! Authentication gate.
//!
//! Runs before the registry, event and current-state routes. Liveness, the
//! probe target and metrics stay open. With mTLS and OAuth both disabled it
//! passes requests through untouched.
//!
//! - OAuth: `Authorization: Bearer <jwt>`, verified with an HMAC secret
//!   (HS256) and optional issuer/audience.
//! - mTLS: the listener does not terminate TLS itself. A TLS-terminating
//!   acceptor in front of the router inserts a [`VerifiedClientCert`]
//!   extension for every verified peer; requests without it are rejected.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AuthConfig;
use crate::error::{AppError, Result};

/// Request extension marking a peer whose client certificate was verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClientCert {
    /// Subject of the client certificate.
    pub subject: String,
}

/// Bearer token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject.
    #[serde(default)]
    pub sub: Option<String>,
    /// Expiration time (Unix timestamp).
    pub exp: u64,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// Verifies requests against the configured gates.
pub struct AuthGate {
    config: AuthConfig,
    decoding_key: Option<DecodingKey>,
}

impl AuthGate {
    pub fn new(config: AuthConfig) -> Self {
        let decoding_key = config
            .oauth_secret
            .as_deref()
            .map(|secret| DecodingKey::from_secret(secret.as_bytes()));
        Self {
            config,
            decoding_key,
        }
    }

    /// Whether any gate is active.
    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Verify a bearer token and return its claims.
    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let Some(key) = &self.decoding_key else {
            return Err(AppError::Unauthorized(
                "OAuth is enabled but no secret is configured".into(),
            ));
        };

        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(iss) = &self.config.oauth_issuer {
            validation.set_issuer(&[iss]);
        }
        match &self.config.oauth_audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        decode::<Claims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::Unauthorized(format!("token verification failed: {e}")))
    }

    /// Check a request against every enabled gate.
    pub fn check(&self, request: &Request) -> Result<()> {
        if self.config.enable_mtls
            && request.extensions().get::<VerifiedClientCert>().is_none()
        {
            return Err(AppError::Unauthorized(
                "client certificate required".into(),
            ));
        }

        if self.config.enable_oauth {
            let header = request
                .headers()
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;

            let token = header
                .strip_prefix("Bearer ")
                .or_else(|| header.strip_prefix("bearer "))
                .ok_or_else(|| AppError::Unauthorized("malformed authorization header".into()))?;

            let claims = self.verify_token(token)?;
            debug!(subject = claims.sub.as_deref().unwrap_or("-"), "bearer token accepted");
        }

        Ok(())
    }
}

/// Middleware applying the [`AuthGate`].
pub async fn require_auth(
    State(gate): State<Arc<AuthGate>>,
    request: Request,
    next: Next,
) -> std::result::Result<Response, AppError> {
    if gate.is_enabled() {
        gate.check(&request)?;
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret";

    fn oauth_config() -> AuthConfig {
        AuthConfig {
            enable_oauth: true,
            oauth_secret: Some(SECRET.to_string()),
            oauth_issuer: Some("cne-auth".to_string()),
            ..AuthConfig::default()
        }
    }

    fn token(secret: &str, iss: &str) -> String {
        let claims = Claims {
            sub: Some("client-1".to_string()),
            exp: now_secs() + 3600,
            iss: Some(iss.to_string()),
            aud: None,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn now_secs() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn request(auth: Option<String>) -> Request {
        let mut builder = Request::builder().uri("/health");
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_disabled_gate_passes() {
        let gate = AuthGate::new(AuthConfig::default());
        assert!(!gate.is_enabled());
        assert!(gate.check(&request(None)).is_ok());
    }

    #[test]
    fn test_valid_bearer_token() {
        let gate = AuthGate::new(oauth_config());
        let auth = format!("Bearer {}", token(SECRET, "cne-auth"));
        assert!(gate.check(&request(Some(auth))).is_ok());
    }

    #[test]
    fn test_rejects_missing_or_bad_token() {
        let gate = AuthGate::new(oauth_config());

        assert!(matches!(
            gate.check(&request(None)),
            Err(AppError::Unauthorized(_))
        ));

        let wrong_secret = format!("Bearer {}", token("other", "cne-auth"));
        assert!(gate.check(&request(Some(wrong_secret))).is_err());

        let wrong_issuer = format!("Bearer {}", token(SECRET, "someone-else"));
        assert!(gate.check(&request(Some(wrong_issuer))).is_err());
    }

    #[test]
    fn test_mtls_requires_client_cert() {
        let gate = AuthGate::new(AuthConfig {
            enable_mtls: true,
            ..AuthConfig::default()
        });

        assert!(gate.check(&request(None)).is_err());

        let mut req = request(None);
        req.extensions_mut().insert(VerifiedClientCert {
            subject: "CN=client".into(),
        });
        assert!(gate.check(&req).is_ok());
    }
}
