use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Access-token claims issued by the login flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: String, username: String, roles: Vec<String>, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            username,
            roles,
            exp: (now + lifetime).timestamp(),
            iat: now.timestamp(),
        }
    }
}

pub fn create_access_token(
    user_id: String,
    username: String,
    roles: Vec<String>,
    secret: &str,
    lifetime: Duration,
) -> anyhow::Result<String> {
    let claims = Claims::new(user_id, username, roles, lifetime);
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(token)
}

pub fn verify_access_token(token: &str, secret: &str) -> anyhow::Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}
