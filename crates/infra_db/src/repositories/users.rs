//! User repository implementation
//!
//! The users table mirrors the identity collaborator's directory; the
//! expense workflow only reads it, `insert` exists for seeding.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::DatabaseError;

/// Role as stored in the `user_role` enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
pub enum DbRole {
    Employee,
    Manager,
    Finance,
}

/// One row of the `users` table
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: DbRole,
    pub manager_id: Option<Uuid>,
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Repository for the `users` table
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Retrieves a user by id, `None` if absent
    pub async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserRow>, DatabaseError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, name, email, role, manager_id, department, created_at
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Users reporting directly to `manager_id`, ordered by name
    pub async fn find_by_manager(&self, manager_id: Uuid) -> Result<Vec<UserRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, name, email, role, manager_id, department, created_at
            FROM users
            WHERE manager_id = $1
            ORDER BY name, email
            "#,
        )
        .bind(manager_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Inserts a user
    pub async fn insert(&self, row: &UserRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, name, email, role, manager_id, department, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(row.user_id)
        .bind(&row.name)
        .bind(&row.email)
        .bind(row.role)
        .bind(row.manager_id)
        .bind(&row.department)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
