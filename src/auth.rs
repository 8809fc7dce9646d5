// src/auth.rs

use actix_web::{HttpMessage, HttpRequest};
use chrono::{DateTime, Duration, Utc};
use futures_util::StreamExt;
use hmac::Hmac;
use log::debug;
use mongodb::bson::doc;
use mongodb::Collection;
use rand::{Rng, RngCore};
use sha2::Sha512;
use subtle::ConstantTimeEq;

use crate::app_state::AppState;
use crate::db::MongoDB;
use crate::error::ServiceError;
use crate::models::{Client, Token};

/// Key-derivation parameters, fixed for all stored credentials.
const PBKDF2_ROUNDS: u32 = 10_000;
const DERIVED_KEY_LEN: usize = 512;
const SALT_LEN: usize = 16;

const TOKEN_LEN: usize = 64;
const TOKEN_TTL_DAYS: i64 = 90;
const TOKEN_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Bearer token extracted from the Authorization header by the middleware.
#[derive(Clone)]
pub struct BearerToken(pub String);

// ─── PURE CRYPTO HELPERS ──────────────────────────────────────────────────────

/// Derives a salted password hash. Returns `(hash, salt)`, both hex encoded.
/// Each call draws a fresh random salt; no state is shared between calls.
pub fn hash_password(plaintext: &str) -> Result<(String, String), ServiceError> {
    let mut salt_bytes = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = hex::encode(salt_bytes);
    let hash = derive_key(plaintext, &salt)?;
    Ok((hash, salt))
}

/// PBKDF2-HMAC-SHA512 with the fixed parameters above, hex encoded.
pub fn derive_key(plaintext: &str, salt: &str) -> Result<String, ServiceError> {
    let mut key = vec![0u8; DERIVED_KEY_LEN];
    pbkdf2::pbkdf2::<Hmac<Sha512>>(
        plaintext.as_bytes(),
        salt.as_bytes(),
        PBKDF2_ROUNDS,
        &mut key,
    )
    .map_err(|e| ServiceError::Crypto(e.to_string()))?;
    Ok(hex::encode(key))
}

/// Generates a high-entropy opaque token string, independent of any password
/// material.
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_CHARSET[rng.gen_range(0..TOKEN_CHARSET.len())] as char)
        .collect()
}

fn new_token(now: DateTime<Utc>) -> Token {
    Token {
        value: generate_token(),
        expires_at: now + Duration::days(TOKEN_TTL_DAYS),
    }
}

// ─── AUTH SERVICE ─────────────────────────────────────────────────────────────

/// Issues and validates tokens and passwords against the credential store.
pub struct AuthService {
    clients: Collection<Client>,
}

impl AuthService {
    pub fn new(db: &MongoDB) -> Self {
        Self {
            clients: db.db.collection::<Client>("Clients"),
        }
    }

    async fn load_client(&self, client_id: &str) -> Result<Client, ServiceError> {
        self.clients
            .find_one(doc! { "_id": client_id })
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("no client with id {}", client_id)))
    }

    /// Verifies a plaintext password against the client's stored hash. The
    /// comparison runs over the full derived key rather than bailing at the
    /// first differing byte.
    pub async fn verify_password(
        &self,
        client_id: &str,
        plaintext: &str,
    ) -> Result<bool, ServiceError> {
        let client = self.load_client(client_id).await?;
        let derived = derive_key(plaintext, &client.salt)?;
        Ok(derived.as_bytes().ct_eq(client.hash.as_bytes()).into())
    }

    /// Issues a fresh token expiring 90 days out and persists it on the
    /// client, overwriting any previous token. One active token per client.
    pub async fn issue_token(&self, client_id: &str) -> Result<Token, ServiceError> {
        let token = new_token(Utc::now());
        self.store_token(client_id, &token).await?;
        debug!("issued token for client {}", client_id);
        Ok(token)
    }

    /// Expires the client's current token immediately by backdating its
    /// expiry. The token value itself is left in place.
    pub async fn expire_token(&self, client_id: &str) -> Result<Token, ServiceError> {
        let client = self.load_client(client_id).await?;
        let mut token = client.token.ok_or_else(|| {
            ServiceError::NotFound(format!("client {} has no issued token", client_id))
        })?;
        token.expires_at = Utc::now();
        self.store_token(client_id, &token).await?;
        Ok(token)
    }

    async fn store_token(&self, client_id: &str, token: &Token) -> Result<(), ServiceError> {
        let update = doc! { "$set": { "token": mongodb::bson::to_bson(token)? } };
        let result = self
            .clients
            .update_one(doc! { "_id": client_id }, update)
            .await?;
        if result.matched_count == 0 {
            return Err(ServiceError::NotFound(format!(
                "no client with id {}",
                client_id
            )));
        }
        Ok(())
    }

    /// True iff the client exists, has a token, the values match, and the
    /// expiry is still in the future. Expired tokens stay on the document.
    pub async fn validate_token(
        &self,
        client_id: &str,
        presented: &str,
    ) -> Result<bool, ServiceError> {
        let client = self.load_client(client_id).await?;
        Ok(client
            .token
            .map(|t| t.is_valid(presented, Utc::now()))
            .unwrap_or(false))
    }

    /// Reverse-lookup of the presented token against the credential store.
    /// True iff exactly one client carries this token value and its admin
    /// flag is set; an ambiguous match fails closed.
    pub async fn is_admin(&self, presented: &str) -> Result<bool, ServiceError> {
        let mut cursor = self
            .clients
            .find(doc! { "token.value": presented })
            .limit(2)
            .await?;

        let mut matched: Vec<Client> = Vec::new();
        while let Some(client) = cursor.next().await {
            matched.push(client?);
        }

        match matched.as_slice() {
            [client] => Ok(client.is_admin
                && client
                    .token
                    .as_ref()
                    .map(|t| t.is_valid(presented, Utc::now()))
                    .unwrap_or(false)),
            _ => Ok(false),
        }
    }
}

// ─── REQUEST GUARDS ───────────────────────────────────────────────────────────

/// The bearer token the middleware stashed on the request, if any.
pub fn bearer_token(req: &HttpRequest) -> Result<String, ServiceError> {
    req.extensions()
        .get::<BearerToken>()
        .map(|t| t.0.clone())
        .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))
}

/// Rejects the request unless the presented token belongs to an admin client.
pub async fn require_admin(req: &HttpRequest, state: &AppState) -> Result<(), ServiceError> {
    let token = bearer_token(req)?;
    if AuthService::new(&state.mongodb).is_admin(&token).await? {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(
            "admin scope required".to_string(),
        ))
    }
}

/// Rejects the request unless the presented token is the given client's
/// current, unexpired token.
pub async fn require_client_token(
    req: &HttpRequest,
    state: &AppState,
    client_id: &str,
) -> Result<(), ServiceError> {
    let token = bearer_token(req)?;
    let valid = match AuthService::new(&state.mongodb)
        .validate_token(client_id, &token)
        .await
    {
        Ok(valid) => valid,
        // An unknown client id means the token cannot belong to it.
        Err(ServiceError::NotFound(_)) => false,
        Err(e) => return Err(e),
    };
    if valid {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(
            "invalid or expired token".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        let (hash, salt) = hash_password("secret").unwrap();
        assert_eq!(derive_key("secret", &salt).unwrap(), hash);
        assert_ne!(derive_key("wrong", &salt).unwrap(), hash);
    }

    #[test]
    fn same_plaintext_hashes_differently() {
        let (hash_a, salt_a) = hash_password("secret").unwrap();
        let (hash_b, salt_b) = hash_password("secret").unwrap();
        assert_ne!(salt_a, salt_b);
        assert_ne!(hash_a, hash_b);
    }

    #[test]
    fn derived_key_has_expected_shape() {
        let (hash, salt) = hash_password("secret").unwrap();
        // 512-byte key and 16-byte salt, hex encoded.
        assert_eq!(hash.len(), DERIVED_KEY_LEN * 2);
        assert_eq!(salt.len(), SALT_LEN * 2);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_tokens_are_opaque_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LEN);
        assert_ne!(a, b);
        assert!(a.bytes().all(|c| TOKEN_CHARSET.contains(&c)));
    }

    #[test]
    fn new_token_expires_ninety_days_out() {
        let now = Utc::now();
        let token = new_token(now);
        assert_eq!(token.expires_at, now + Duration::days(90));
        assert!(token.is_valid(&token.value, now));
        // Round-trip of property 4: backdating the expiry invalidates it.
        let expired = Token {
            expires_at: now - Duration::days(1),
            ..token.clone()
        };
        assert!(!expired.is_valid(&token.value, now));
    }
}
