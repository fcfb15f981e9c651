use chrono::{DateTime, Utc};
use ulid::Ulid;

/// Identity record. The id is a ULID so rows sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    pub phone: String,
    /// Argon2id hash string, never the raw password.
    pub password: String,
    pub roles: Vec<String>,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new unverified user with the default role.
    #[must_use]
    pub fn new(name: String, email: String, password_hash: String, phone: String) -> Self {
        let now = Utc::now();
        Self {
            id: Ulid::new(),
            name,
            email,
            phone,
            password: password_hash,
            roles: vec!["user".to_string()],
            email_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}
