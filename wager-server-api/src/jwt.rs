use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use log::warn;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wager_server_domain::{
    IdentityId, ServiceError, ServiceResult,
    identity::{IdentityResolver, ResolvedIdentity},
};

const FALLBACK_DISPLAY_NAME: &str = "Player";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: IdentityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    exp: usize,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

fn read_or_generate_secret() -> Vec<u8> {
    if let Ok(secret) = std::env::var("WAGER_JWT_SECRET") {
        secret.as_bytes().to_vec()
    } else {
        warn!("WAGER_JWT_SECRET not set, generating a random one; issued tokens die with the process");
        Uuid::new_v4().as_bytes().to_vec()
    }
}

/// Resolves bearer tokens signed with the shared HMAC secret.
pub struct JwtIdentityResolver {
    keys: Keys,
}

impl JwtIdentityResolver {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            keys: Keys::new(secret),
        }
    }

    pub fn from_env() -> Self {
        Self::new(&read_or_generate_secret())
    }

    pub fn generate_jwt(&self, user_id: &IdentityId, name: Option<&str>) -> ServiceResult<String> {
        let claims = Claims {
            user_id: user_id.clone(),
            name: name.map(str::to_string),
            exp: (chrono::Utc::now() + chrono::Duration::hours(24)).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.keys.encoding)
            .map_err(|e| ServiceError::Internal(format!("Failed to sign token: {}", e)))
    }

    pub fn validate_jwt(&self, token: &str) -> ServiceResult<Claims> {
        match decode::<Claims>(token, &self.keys.decoding, &Validation::default()) {
            Ok(data) => Ok(data.claims),
            Err(e) => ServiceError::unauthorized(format!("Invalid token: {}", e)),
        }
    }
}

#[async_trait::async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, token: &str) -> ServiceResult<ResolvedIdentity> {
        let claims = self.validate_jwt(token)?;
        Ok(ResolvedIdentity {
            id: claims.user_id,
            display_name: claims
                .name
                .unwrap_or_else(|| FALLBACK_DISPLAY_NAME.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_issued_token_resolves() {
        let resolver = JwtIdentityResolver::new(b"secret");
        let token = resolver
            .generate_jwt(&"user-42".to_string(), Some("Dana"))
            .expect("Failed to sign");
        let resolved = resolver.resolve(&token).await.expect("Token should resolve");
        assert_eq!(
            resolved,
            ResolvedIdentity {
                id: "user-42".to_string(),
                display_name: "Dana".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_nameless_token_gets_fallback_name() {
        let resolver = JwtIdentityResolver::new(b"secret");
        let token = resolver
            .generate_jwt(&"user-7".to_string(), None)
            .expect("Failed to sign");
        let resolved = resolver.resolve(&token).await.expect("Token should resolve");
        assert_eq!(resolved.display_name, FALLBACK_DISPLAY_NAME);
    }

    #[tokio::test]
    async fn test_foreign_or_garbage_token_is_rejected() {
        let issuer = JwtIdentityResolver::new(b"other-secret");
        let token = issuer
            .generate_jwt(&"user-1".to_string(), None)
            .expect("Failed to sign");
        let resolver = JwtIdentityResolver::new(b"secret");
        assert!(matches!(
            resolver.resolve(&token).await,
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(resolver.resolve("not-a-jwt").await.is_err());
    }
}
