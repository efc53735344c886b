//! PostgreSQL User Directory Adapter

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{DomainPort, HealthCheckResult, HealthCheckable, PortError, UserId};
use domain_expense::{Role, User, UserDirectory};

use crate::repositories::{DbRole, UserRepository, UserRow};

const ADAPTER_ID: &str = "postgres-user-directory";

/// PostgreSQL-backed implementation of `UserDirectory`
#[derive(Debug, Clone)]
pub struct PgUserDirectory {
    repository: UserRepository,
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: UserRepository::new(pool.clone()),
            pool,
        }
    }

    /// Adds a user to the directory
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn insert(&self, user: &User) -> Result<(), PortError> {
        self.repository.insert(&to_row(user)).await?;
        Ok(())
    }
}

impl DomainPort for PgUserDirectory {}

#[async_trait]
impl HealthCheckable for PgUserDirectory {
    async fn health_check(&self) -> HealthCheckResult {
        super::ping(&self.pool, ADAPTER_ID).await
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    #[instrument(skip(self), fields(user_id = %id))]
    async fn get_user(&self, id: UserId) -> Result<Option<User>, PortError> {
        let row = self.repository.find_by_id(*id.as_uuid()).await?;
        Ok(row.map(from_row))
    }

    #[instrument(skip(self), fields(manager_id = %manager_id))]
    async fn team_members(&self, manager_id: UserId) -> Result<Vec<User>, PortError> {
        let rows = self
            .repository
            .find_by_manager(*manager_id.as_uuid())
            .await?;
        Ok(rows.into_iter().map(from_row).collect())
    }
}

fn role_to_db(role: Role) -> DbRole {
    match role {
        Role::Employee => DbRole::Employee,
        Role::Manager => DbRole::Manager,
        Role::Finance => DbRole::Finance,
    }
}

fn role_from_db(role: DbRole) -> Role {
    match role {
        DbRole::Employee => Role::Employee,
        DbRole::Manager => Role::Manager,
        DbRole::Finance => Role::Finance,
    }
}

fn to_row(user: &User) -> UserRow {
    UserRow {
        user_id: *user.id.as_uuid(),
        name: user.name.clone(),
        email: user.email.clone(),
        role: role_to_db(user.role),
        manager_id: user.manager_id.map(|id| *id.as_uuid()),
        department: user.department.clone(),
        created_at: Utc::now(),
    }
}

fn from_row(row: UserRow) -> User {
    User {
        id: UserId::from_uuid(row.user_id),
        name: row.name,
        email: row.email,
        role: role_from_db(row.role),
        manager_id: row.manager_id.map(UserId::from_uuid),
        department: row.department,
    }
}
