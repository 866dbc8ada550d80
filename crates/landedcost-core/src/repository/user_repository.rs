//! User Repository

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::User;
use crate::Result;

/// User repository trait - database agnostic
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn create(&self, email: &str) -> Result<User>;
}

/// PostgreSQL implementation of UserRepository
pub struct PostgresUserRepository {
    db: sqlx::PgPool,
}

impl PostgresUserRepository {
    pub fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;

        Ok(user)
    }

    async fn create(&self, email: &str) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (id, email) VALUES ($1, $2) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .fetch_one(&self.db)
        .await?;

        Ok(user)
    }
}
