//! ABOUTME: User repository with lookup by id or email
//! ABOUTME: User changes publish no notifications on the shared bus

use sb_core::{Error, Result};
use sb_store::{Collection, Query};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use validator::Validate;

/// User entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[validate(length(min = 1))]
    pub id: String,
    #[validate(email)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// User repository
pub struct UserRepository<'a> {
    collection: &'a Collection<User>,
}

impl<'a> UserRepository<'a> {
    pub fn new(collection: &'a Collection<User>) -> Self {
        Self { collection }
    }

    /// Find a user by id
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        debug!("Finding user by id: {}", id);
        Ok(self.collection.find(id).await?)
    }

    /// Find a user by email; first match if several share the address
    #[instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        debug!("Finding user by email: {}", email);
        let matches = self
            .collection
            .search(&Query::new().eq("email", email))
            .await?;
        Ok(matches.into_iter().next())
    }

    /// List every user
    #[instrument(skip(self))]
    pub async fn find_all(&self) -> Result<Vec<User>> {
        let users = self.collection.search(&Query::new()).await?;
        debug!("Found {} users", users.len());
        Ok(users)
    }

    /// Validate and upsert a user by id
    #[instrument(skip(self, user))]
    pub async fn upsert(&self, user: User) -> Result<User> {
        user.validate()
            .map_err(|e| Error::Validation(format!("Invalid user: {}", e)))?;

        self.collection
            .update(&Query::new().eq("id", user.id.as_str()), &user)
            .await?;

        debug!("Upserted user: {}", user.id);
        Ok(user)
    }

    /// Delete a user; deleting an unknown id is not an error
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let removed = self.collection.delete(&Query::new().eq("id", id)).await?;
        debug!("Deleted {} user record(s) for id: {}", removed, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, email: &str) -> User {
        User {
            id: id.to_string(),
            email: email.to_string(),
            name: None,
            avatar_url: None,
        }
    }

    #[tokio::test]
    async fn upsert_and_lookup_by_id_and_email() {
        let collection = Collection::in_memory().await.unwrap();
        let repo = UserRepository::new(&collection);

        repo.upsert(user("u-1", "one@example.com")).await.unwrap();
        repo.upsert(user("u-2", "two@example.com")).await.unwrap();

        let by_id = repo.find_by_id("u-2").await.unwrap().unwrap();
        assert_eq!(by_id.email, "two@example.com");

        let by_email = repo.find_by_email("one@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, "u-1");

        assert!(repo.find_by_email("nobody@example.com").await.unwrap().is_none());
        assert_eq!(repo.find_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let collection = Collection::in_memory().await.unwrap();
        let repo = UserRepository::new(&collection);

        repo.upsert(user("u-1", "old@example.com")).await.unwrap();
        repo.upsert(user("u-1", "new@example.com")).await.unwrap();

        assert_eq!(repo.find_all().await.unwrap().len(), 1);
        let found = repo.find_by_id("u-1").await.unwrap().unwrap();
        assert_eq!(found.email, "new@example.com");
    }

    #[tokio::test]
    async fn absent_profile_fields_survive_overwrite() {
        let collection = Collection::in_memory().await.unwrap();
        let repo = UserRepository::new(&collection);

        let mut named = user("u-1", "one@example.com");
        named.name = Some("First One".to_string());
        repo.upsert(named).await.unwrap();

        repo.upsert(user("u-1", "one@example.com")).await.unwrap();

        let found = repo.find_by_id("u-1").await.unwrap().unwrap();
        assert_eq!(found.name.as_deref(), Some("First One"));
    }

    #[tokio::test]
    async fn invalid_email_is_rejected() {
        let collection = Collection::in_memory().await.unwrap();
        let repo = UserRepository::new(&collection);

        let err = repo.upsert(user("u-1", "not-an-email")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(repo.find_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let collection = Collection::in_memory().await.unwrap();
        let repo = UserRepository::new(&collection);

        repo.upsert(user("u-1", "one@example.com")).await.unwrap();
        repo.delete("u-1").await.unwrap();
        assert!(repo.find_by_id("u-1").await.unwrap().is_none());
        repo.delete("u-1").await.unwrap();
    }
}
