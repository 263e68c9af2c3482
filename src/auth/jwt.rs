use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DataError, DataResult};
use crate::model::Role;

/// Access-token claims issued by the hosted auth service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    /// Display name.
    pub name: String,
    /// Durable assigned role, enforced by the store's row-level security.
    pub role: Role,
    pub exp: usize,
    pub jti: String,
}

pub fn decode_claims(token: &str, secret: &str) -> DataResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| DataError::Authorization(format!("invalid token: {e}")))
}
