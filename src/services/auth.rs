use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

const ACCESS_TOKEN_LIFETIME_HOURS: i64 = 24;

/// JWT claims carried by every authenticated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub wallet: String,
    pub exp: i64,
}

/// HS256 issuer/verifier for wallet access tokens.
pub struct AuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl AuthService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Issue a token for the wallet address, valid for 24 hours.
    pub fn issue(&self, wallet: &str) -> Result<String> {
        let exp = (Utc::now() + Duration::hours(ACCESS_TOKEN_LIFETIME_HOURS)).timestamp();
        self.issue_with_expiry(wallet, exp)
    }

    fn issue_with_expiry(&self, wallet: &str, exp: i64) -> Result<String> {
        let claims = AccessToken {
            wallet: wallet.to_string(),
            exp,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("failed to encode a jwt: {}", e)))
    }

    /// Verify the signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<AccessToken> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<AccessToken>(token, &self.decoding, &validation)
            .map_err(|e| AppError::Unauthorized(format!("invalid access token: {}", e)))?;

        if data.claims.wallet.is_empty() {
            return Err(AppError::Unauthorized("empty wallet claim".into()));
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips() {
        let auth = AuthService::new("token-secret");
        let token = auth.issue("0xAAAA000000000000000000000000000000000001").unwrap();
        let claims = auth.verify(&token).unwrap();
        assert_eq!(claims.wallet, "0xAAAA000000000000000000000000000000000001");
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = AuthService::new("token-secret");
        let exp = (Utc::now() - Duration::hours(1)).timestamp();
        let token = auth.issue_with_expiry("0xaaaa", exp).unwrap();
        assert!(auth.verify(&token).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = AuthService::new("one").issue("0xaaaa").unwrap();
        assert!(AuthService::new("two").verify(&token).is_err());
    }
}
