use serde::{Deserialize, Serialize};

/// A donor account. Donors authenticate with a bearer token whose
/// SHA-256 hash is stored here - the raw token is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub api_token_hash: String,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
}
