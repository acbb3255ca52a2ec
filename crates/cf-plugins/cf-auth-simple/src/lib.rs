//! # cf-auth-simple
//!
//! HMAC-SHA256 implementation of `IdentityProvider`.
//! Tokens are `base64url(claims).hex(signature)`; the claims carry the user
//! id, the role set and an expiry.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cf_core::models::{Identity, Role};
use cf_core::traits::IdentityProvider;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    roles: Vec<Role>,
    /// Unix seconds
    exp: i64,
}

pub struct SimpleIdentityProvider {
    /// Signing key (e.g., from `CLASSFEED__AUTH__TOKEN_SECRET`)
    secret: SecretString,
    token_ttl: Duration,
}

impl SimpleIdentityProvider {
    pub fn new(secret: SecretString, token_ttl: Duration) -> Self {
        Self { secret, token_ttl }
    }

    fn mac(&self) -> anyhow::Result<HmacSha256> {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid signing key: {e}"))
    }

    /// Issues a bearer token for `identity`, valid for the configured TTL.
    pub fn issue_token(&self, identity: &Identity) -> anyhow::Result<String> {
        self.issue_token_at(identity, Utc::now())
    }

    pub fn issue_token_at(&self, identity: &Identity, issued_at: DateTime<Utc>) -> anyhow::Result<String> {
        let claims = Claims {
            sub: identity.user_id,
            roles: identity.roles.clone(),
            exp: (issued_at + self.token_ttl).timestamp(),
        };
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }

    /// Checks signature and expiry against `now`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> anyhow::Result<Option<Identity>> {
        let Some((payload, signature)) = token.split_once('.') else {
            return Ok(None);
        };
        let Ok(signature) = hex::decode(signature) else {
            return Ok(None);
        };

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            tracing::debug!("token signature mismatch");
            return Ok(None);
        }

        // Signed by us, so a payload that fails to decode is a bug on our side.
        let claims: Claims = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload)?)?;
        if claims.exp < now.timestamp() {
            tracing::debug!(user_id = %claims.sub, "token expired");
            return Ok(None);
        }

        Ok(Some(Identity {
            user_id: claims.sub,
            roles: claims.roles,
        }))
    }
}

#[async_trait]
impl IdentityProvider for SimpleIdentityProvider {
    async fn authenticate(&self, token: &str) -> anyhow::Result<Option<Identity>> {
        self.verify_at(token, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn provider(secret: &str) -> SimpleIdentityProvider {
        SimpleIdentityProvider::new(SecretString::from(secret.to_string()), Duration::hours(1))
    }

    fn teacher() -> Identity {
        Identity {
            user_id: Uuid::now_v7(),
            roles: vec![Role::Teacher],
        }
    }

    #[test]
    fn test_issued_token_verifies() {
        let auth = provider("s3cret");
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let identity = teacher();

        let token = auth.issue_token_at(&identity, at).unwrap();
        let verified = auth.verify_at(&token, at + Duration::minutes(30)).unwrap();
        assert_eq!(verified, Some(identity));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let auth = provider("s3cret");
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let token = auth.issue_token_at(&teacher(), at).unwrap();

        assert!(auth.verify_at(&token, at + Duration::hours(2)).unwrap().is_none());
    }

    #[test]
    fn test_foreign_or_tampered_tokens_are_rejected() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let token = provider("other").issue_token_at(&teacher(), at).unwrap();
        let auth = provider("s3cret");
        assert!(auth.verify_at(&token, at).unwrap().is_none());

        let ours = auth.issue_token_at(&teacher(), at).unwrap();
        let (_, signature) = ours.split_once('.').unwrap();
        let forged_claims = Claims {
            sub: Uuid::now_v7(),
            roles: vec![Role::Admin],
            exp: at.timestamp() + 60,
        };
        let forged = format!(
            "{}.{signature}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap())
        );
        assert!(auth.verify_at(&forged, at).unwrap().is_none());

        assert!(auth.verify_at("garbage", at).unwrap().is_none());
        assert!(auth.verify_at("abc.not-hex", at).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_authenticate_uses_wall_clock() {
        let auth = provider("s3cret");
        let identity = teacher();
        let token = auth.issue_token(&identity).unwrap();
        assert_eq!(auth.authenticate(&token).await.unwrap(), Some(identity));
    }
}
