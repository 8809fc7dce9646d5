use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An API consumer. Owns teams, which in turn own polls.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Client {
    /// MongoDB document ID.
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    /// PBKDF2-derived password hash, hex encoded. Only the auth module reads this.
    pub hash: String,
    /// Random per-client salt, hex encoded. Only the auth module reads this.
    pub salt: String,
    /// The currently issued bearer token, if any. Reissuing overwrites it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
    #[serde(default)]
    pub is_admin: bool,
}

impl Client {
    /// The client as returned over the API, without password material.
    pub fn view(&self) -> ClientView {
        ClientView {
            id: self.id.clone(),
            username: self.username.clone(),
            token: self.token.clone(),
            is_admin: self.is_admin,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClientView {
    pub id: String,
    pub username: String,
    pub token: Option<Token>,
    pub is_admin: bool,
}

/// Opaque bearer credential with a fixed-duration expiry.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Token {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// True iff the presented value matches and the token has not yet expired.
    /// Expired tokens are invalid but are not cleared from the client document.
    pub fn is_valid(&self, presented: &str, now: DateTime<Utc>) -> bool {
        self.value == presented && now < self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn token_valid_before_expiry() {
        let now = Utc::now();
        let token = Token {
            value: "abc123".to_string(),
            expires_at: now + Duration::days(90),
        };
        assert!(token.is_valid("abc123", now));
        assert!(!token.is_valid("abc124", now));
    }

    #[test]
    fn token_invalid_after_expiry() {
        let now = Utc::now();
        let token = Token {
            value: "abc123".to_string(),
            expires_at: now - Duration::seconds(1),
        };
        assert!(!token.is_valid("abc123", now));
    }
}
