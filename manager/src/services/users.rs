//! Backup actors

use uuid::Uuid;

use super::Repositories;
use crate::errors::ManagerError;
use crate::models::User;
use crate::store::{query_unique, Filter, OrderBy};

pub struct UserService {
    repos: Repositories,
}

impl UserService {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    pub async fn create(&self, username: String) -> Result<User, ManagerError> {
        if username.trim().is_empty() {
            return Err(ManagerError::ValidationError(
                "Username cannot be empty".to_string(),
            ));
        }
        let existing =
            query_unique(self.repos.users.as_ref(), &[Filter::eq("username", username.as_str())])
                .await?;
        if existing.is_some() {
            return Err(ManagerError::Conflict(format!(
                "username {} is already in use",
                username
            )));
        }

        let user = User::new(username);
        self.repos.users.add(&user).await?;
        Ok(user)
    }

    pub async fn list(&self) -> Result<Vec<User>, ManagerError> {
        self.repos
            .users
            .query(&[], Some(OrderBy::asc("username")))
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<User, ManagerError> {
        self.repos
            .users
            .get(id)
            .await?
            .ok_or_else(|| ManagerError::NotFound(format!("user {}", id)))
    }
}
