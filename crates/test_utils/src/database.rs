//! PostgreSQL test containers
//!
//! Each database test gets its own throwaway PostgreSQL with the expense
//! schema loaded, so tests never observe each other's rows.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use testcontainers::{
    core::{IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    ContainerAsync, GenericImage, ImageExt,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const IMAGE: (&str, &str) = ("postgres", "16-alpine");
const USER: &str = "expenses";
const PASSWORD: &str = "expenses";
const DATABASE: &str = "expenses_test";

/// The migration the server applies, loaded verbatim
pub const SCHEMA: &str = include_str!("../../../migrations/20260101000000_expenses.sql");

fn connection_url(host: &str, port: u16) -> String {
    format!("postgres://{USER}:{PASSWORD}@{host}:{port}/{DATABASE}")
}

/// A running container plus a pool connected to it
///
/// The container stops when this value is dropped.
pub struct TestDatabase {
    _container: ContainerAsync<GenericImage>,
    pool: PgPool,
}

impl TestDatabase {
    /// Starts a container and loads the schema
    pub async fn start() -> Result<Self, BoxError> {
        let (name, tag) = IMAGE;
        let container = GenericImage::new(name, tag)
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_USER", USER)
            .with_env_var("POSTGRES_PASSWORD", PASSWORD)
            .with_env_var("POSTGRES_DB", DATABASE)
            .start()
            .await?;

        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(5432).await?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_url(&host, port))
            .await?;
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Declares a database test
///
/// The body receives a `PgPool` bound to `$pool`. These tests need a
/// container runtime and are ignored by default; run them with
/// `cargo test -- --ignored`.
#[macro_export]
macro_rules! db_test {
    ($name:ident, |$pool:ident| $body:block) => {
        #[tokio::test]
        #[ignore = "requires a container runtime"]
        async fn $name() {
            let db = $crate::database::TestDatabase::start()
                .await
                .expect("failed to start test database");
            let $pool = db.pool().clone();
            $body
        }
    };
}
