//! In-memory store implementations. Used by the test suites and by local
//! development runs where a real database is overkill; semantics mirror
//! the Postgres stores (last write wins, most-recent code per kind).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use ulid::Ulid;

use crate::domain::{
    Error, User, UserStore, VerificationCode, VerificationCodeKind, VerificationCodeStore,
};

#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Ulid, User>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Ulid, User>> {
        self.users
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Ulid, User>> {
        self.users
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: &User) -> Result<(), Error> {
        let mut users = self.write();
        if users.values().any(|u| u.email == user.email) {
            return Err(Error::UserAlreadyExists);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Ulid) -> Result<User, Error> {
        self.read().get(&id).cloned().ok_or(Error::NotFound)
    }

    async fn find_by_email(&self, email: &str) -> Result<User, Error> {
        self.read()
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, Error> {
        Ok(self.read().values().any(|u| u.email == email))
    }

    async fn update(&self, user: &User) -> Result<(), Error> {
        let mut users = self.write();
        if !users.contains_key(&user.id) {
            return Err(Error::NotFound);
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_password(&self, id: Ulid, password_hash: &str) -> Result<(), Error> {
        let mut users = self.write();
        let user = users.get_mut(&id).ok_or(Error::NotFound)?;
        user.password = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: Ulid) -> Result<(), Error> {
        self.write().remove(&id).map(|_| ()).ok_or(Error::NotFound)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, Error> {
        let mut users: Vec<User> = self.read().values().cloned().collect();
        users.sort_by_key(|u| u.id);
        Ok(users
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn add_role(&self, id: Ulid, role: &str) -> Result<(), Error> {
        let mut users = self.write();
        let user = users.get_mut(&id).ok_or(Error::NotFound)?;
        if !user.has_role(role) {
            user.roles.push(role.to_string());
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn remove_role(&self, id: Ulid, role: &str) -> Result<(), Error> {
        let mut users = self.write();
        let user = users.get_mut(&id).ok_or(Error::NotFound)?;
        user.roles.retain(|r| r != role);
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryVerificationCodeStore {
    codes: RwLock<Vec<VerificationCode>>,
}

impl MemoryVerificationCodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<VerificationCode>> {
        self.codes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<VerificationCode>> {
        self.codes
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Number of live rows, for test assertions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[async_trait]
impl VerificationCodeStore for MemoryVerificationCodeStore {
    async fn create(&self, code: &VerificationCode) -> Result<(), Error> {
        self.write().push(code.clone());
        Ok(())
    }

    async fn find_by_code(&self, code: &str) -> Result<VerificationCode, Error> {
        self.read()
            .iter()
            .filter(|c| c.code == code)
            .max_by_key(|c| c.created_at)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn find_by_user_and_kind(
        &self,
        user_id: Ulid,
        kind: VerificationCodeKind,
    ) -> Result<VerificationCode, Error> {
        self.read()
            .iter()
            .filter(|c| c.user_id == user_id && c.kind == kind)
            .max_by_key(|c| c.created_at)
            .cloned()
            .ok_or(Error::NotFound)
    }

    async fn delete_by_user_and_kind(
        &self,
        user_id: Ulid,
        kind: VerificationCodeKind,
    ) -> Result<(), Error> {
        self.write()
            .retain(|c| !(c.user_id == user_id && c.kind == kind));
        Ok(())
    }

    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<(), Error> {
        self.write().retain(|c| c.expires_at >= before);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(email: &str) -> User {
        User::new(
            "Test".to_string(),
            email.to_string(),
            "hash".to_string(),
            String::new(),
        )
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email() -> Result<(), Error> {
        let store = MemoryUserStore::new();
        store.create(&user("a@x.com")).await?;
        assert!(matches!(
            store.create(&user("a@x.com")).await,
            Err(Error::UserAlreadyExists)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn roles_can_be_added_and_removed() -> Result<(), Error> {
        let store = MemoryUserStore::new();
        let u = user("a@x.com");
        store.create(&u).await?;

        store.add_role(u.id, "admin").await?;
        store.add_role(u.id, "admin").await?;
        let found = store.find_by_id(u.id).await?;
        assert_eq!(found.roles, vec!["user".to_string(), "admin".to_string()]);

        store.remove_role(u.id, "admin").await?;
        let found = store.find_by_id(u.id).await?;
        assert_eq!(found.roles, vec!["user".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn list_paginates_in_id_order() -> Result<(), Error> {
        let store = MemoryUserStore::new();
        for i in 0..5 {
            store.create(&user(&format!("u{i}@x.com"))).await?;
        }
        let page = store.list(2, 2).await?;
        assert_eq!(page.len(), 2);
        let all = store.list(10, 0).await?;
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0].id <= w[1].id));
        Ok(())
    }

    #[tokio::test]
    async fn find_by_user_and_kind_returns_most_recent() -> Result<(), Error> {
        let store = MemoryVerificationCodeStore::new();
        let user_id = Ulid::new();

        let mut first = VerificationCode::new(
            user_id,
            "111111".to_string(),
            VerificationCodeKind::EmailVerification,
            Duration::hours(1),
        );
        first.created_at = Utc::now() - Duration::minutes(5);
        store.create(&first).await?;

        let second = VerificationCode::new(
            user_id,
            "222222".to_string(),
            VerificationCodeKind::EmailVerification,
            Duration::hours(1),
        );
        store.create(&second).await?;

        let found = store
            .find_by_user_and_kind(user_id, VerificationCodeKind::EmailVerification)
            .await?;
        assert_eq!(found.code, "222222");
        Ok(())
    }

    #[tokio::test]
    async fn delete_by_user_and_kind_is_scoped() -> Result<(), Error> {
        let store = MemoryVerificationCodeStore::new();
        let user_id = Ulid::new();

        store
            .create(&VerificationCode::new(
                user_id,
                "111111".to_string(),
                VerificationCodeKind::EmailVerification,
                Duration::hours(1),
            ))
            .await?;
        store
            .create(&VerificationCode::new(
                user_id,
                "222222".to_string(),
                VerificationCodeKind::PasswordReset,
                Duration::hours(1),
            ))
            .await?;

        store
            .delete_by_user_and_kind(user_id, VerificationCodeKind::EmailVerification)
            .await?;

        assert!(store
            .find_by_user_and_kind(user_id, VerificationCodeKind::EmailVerification)
            .await
            .is_err());
        assert!(store
            .find_by_user_and_kind(user_id, VerificationCodeKind::PasswordReset)
            .await
            .is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn delete_expired_sweeps_old_rows() -> Result<(), Error> {
        let store = MemoryVerificationCodeStore::new();
        let user_id = Ulid::new();

        store
            .create(&VerificationCode::new(
                user_id,
                "111111".to_string(),
                VerificationCodeKind::EmailVerification,
                Duration::hours(-1),
            ))
            .await?;
        store
            .create(&VerificationCode::new(
                user_id,
                "222222".to_string(),
                VerificationCodeKind::EmailVerification,
                Duration::hours(1),
            ))
            .await?;

        store.delete_expired(Utc::now()).await?;
        assert_eq!(store.len(), 1);
        Ok(())
    }
}
