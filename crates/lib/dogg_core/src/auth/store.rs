//! Identity store contract and the bundled in-memory implementation.
//!
//! Uniqueness of username and (lower-cased) email is enforced inside the
//! store under a single write lock, so two concurrent registrations for the
//! same email cannot both succeed even if both passed the handler's
//! pre-check.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::auth::{NewUser, ProfileUpdate, UserRecord};
use crate::validation::FieldError;
use crate::validation::identity::{EMAIL_TAKEN, USERNAME_TAKEN};
use crate::validation::schema::normalize_email;

/// Identity store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique field collided with an existing record.
    #[error("duplicate {}", .0.path)]
    Duplicate(FieldError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence collaborator for identity records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a record, failing with [`StoreError::Duplicate`] on a username
    /// or email collision.
    async fn insert(&self, user: NewUser) -> Result<UserRecord, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Lookup by email; the argument is case-normalized first.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Apply a profile update, returning the new record (`None` if absent).
    async fn update_profile(
        &self,
        id: &str,
        update: ProfileUpdate,
    ) -> Result<Option<UserRecord>, StoreError>;

    /// Remove a record. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, UserRecord>,
    by_email: HashMap<String, String>,
    by_username: HashMap<String, String>,
}

/// Process-local identity store.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    tables: RwLock<Tables>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored identities.
    pub async fn len(&self) -> usize {
        self.tables.read().await.users.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn insert(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let email = normalize_email(&user.email);
        let mut tables = self.tables.write().await;

        if tables.by_username.contains_key(&user.username) {
            return Err(StoreError::Duplicate(FieldError::new("username", USERNAME_TAKEN)));
        }
        if tables.by_email.contains_key(&email) {
            return Err(StoreError::Duplicate(FieldError::new("email", EMAIL_TAKEN)));
        }

        let now = Utc::now();
        let record = UserRecord {
            // v7 ids sort by creation time.
            id: Uuid::now_v7().to_string(),
            username: user.username,
            email,
            password_hash: user.password_hash,
            avatar_url: user.avatar_url,
            created_at: now,
            updated_at: now,
        };
        tables
            .by_username
            .insert(record.username.clone(), record.id.clone());
        tables.by_email.insert(record.email.clone(), record.id.clone());
        tables.users.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_email
            .get(&normalize_email(email))
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_username
            .get(username)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn update_profile(
        &self,
        id: &str,
        update: ProfileUpdate,
    ) -> Result<Option<UserRecord>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(current) = tables.users.get(id).cloned() else {
            return Ok(None);
        };

        let mut next = current.clone();
        if let Some(username) = update.username
            && username != current.username
        {
            if tables.by_username.contains_key(&username) {
                return Err(StoreError::Duplicate(FieldError::new("username", USERNAME_TAKEN)));
            }
            tables.by_username.remove(&current.username);
            tables.by_username.insert(username.clone(), id.to_string());
            next.username = username;
        }
        if let Some(avatar_url) = update.avatar_url {
            next.avatar_url = avatar_url;
        }
        next.updated_at = Utc::now();
        tables.users.insert(id.to_string(), next.clone());
        Ok(Some(next))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(record) = tables.users.remove(id) else {
            return Ok(false);
        };
        tables.by_email.remove(&record.email);
        tables.by_username.remove(&record.username);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            password_hash: "$2b$04$placeholder".into(),
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn insert_and_find() {
        let store = InMemoryUserStore::new();
        let rec = store.insert(new_user("alice", "alice@example.com")).await.unwrap();
        assert_eq!(store.find_by_id(&rec.id).await.unwrap().unwrap().username, "alice");
        assert!(store.find_by_username("alice").await.unwrap().is_some());
        assert!(store.find_by_email("ALICE@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn ids_are_time_ordered_v7() {
        let store = InMemoryUserStore::new();
        let a = store.insert(new_user("first", "first@example.com")).await.unwrap();
        let b = store.insert(new_user("second", "second@example.com")).await.unwrap();
        let a_id = Uuid::parse_str(&a.id).unwrap();
        let b_id = Uuid::parse_str(&b.id).unwrap();
        assert_eq!(a_id.get_version(), Some(uuid::Version::SortRand));
        assert!(b_id > a_id);
    }

    #[tokio::test]
    async fn email_is_stored_lowercased() {
        let store = InMemoryUserStore::new();
        let rec = store.insert(new_user("alice", "Alice@Example.COM")).await.unwrap();
        assert_eq!(rec.email, "alice@example.com");
    }

    #[tokio::test]
    async fn duplicate_email_differing_in_case_is_rejected() {
        let store = InMemoryUserStore::new();
        store.insert(new_user("alice", "test@example.com")).await.unwrap();
        let err = store
            .insert(new_user("bob", "TEST@EXAMPLE.COM"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(ref f) if f.path == "email"));
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let store = InMemoryUserStore::new();
        store.insert(new_user("alice", "a@example.com")).await.unwrap();
        let err = store.insert(new_user("alice", "b@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(ref f) if f.path == "username"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registrations_admit_exactly_one() {
        let store = Arc::new(InMemoryUserStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .insert(new_user(&format!("user{i}"), "race@example.com"))
                    .await
                    .is_ok()
            }));
        }
        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn update_profile_changes_fields_and_timestamp() {
        let store = InMemoryUserStore::new();
        let rec = store.insert(new_user("alice", "a@example.com")).await.unwrap();
        let updated = store
            .update_profile(
                &rec.id,
                ProfileUpdate {
                    username: Some("alice2".into()),
                    avatar_url: Some(Some("https://cdn.example.com/a.png".into())),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.username, "alice2");
        assert!(updated.updated_at >= rec.updated_at);
        assert!(store.find_by_username("alice").await.unwrap().is_none());
        assert!(store.find_by_username("alice2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_frees_unique_keys() {
        let store = InMemoryUserStore::new();
        let rec = store.insert(new_user("alice", "a@example.com")).await.unwrap();
        assert!(store.delete(&rec.id).await.unwrap());
        assert!(!store.delete(&rec.id).await.unwrap());
        assert!(store.insert(new_user("alice", "a@example.com")).await.is_ok());
    }
}
