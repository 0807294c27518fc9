//! Connection configuration.

use crate::error::{OrmError, OrmResult};

/// Environment variable holding the database URL.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
/// Environment variable holding the pool size.
pub const MAX_POOL_SIZE_ENV: &str = "DATABASE_MAX_POOL_SIZE";

/// Where and how to connect.
///
/// ```ignore
/// let conn = DatabaseConfig::from_env()?.max_pool_size(8).connect().await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    /// Pool connections when set; otherwise use one direct connection.
    pub max_pool_size: Option<usize>,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_pool_size: None,
        }
    }

    /// Read `DATABASE_URL` and the optional `DATABASE_MAX_POOL_SIZE`.
    pub fn from_env() -> OrmResult<Self> {
        let url = std::env::var(DATABASE_URL_ENV)
            .map_err(|_| OrmError::configuration(format!("{DATABASE_URL_ENV} is not set")))?;
        let max_pool_size = match std::env::var(MAX_POOL_SIZE_ENV) {
            Ok(raw) => Some(raw.trim().parse::<usize>().map_err(|e| {
                OrmError::configuration(format!("invalid {MAX_POOL_SIZE_ENV} '{raw}': {e}"))
            })?),
            Err(_) => None,
        };
        Ok(Self { url, max_pool_size })
    }

    pub fn max_pool_size(mut self, size: usize) -> Self {
        self.max_pool_size = Some(size);
        self
    }

    /// Build a Postgres-backed [`Connection`](crate::Connection) and verify
    /// it can reach the server.
    #[cfg(feature = "postgres")]
    pub async fn connect(&self) -> OrmResult<crate::Connection> {
        use crate::adapter::Adapter;
        use crate::postgres::PgAdapter;

        let adapter = match self.max_pool_size {
            #[cfg(feature = "pool")]
            Some(size) => PgAdapter::from_pool(create_pool(&self.url, size)?),
            #[cfg(not(feature = "pool"))]
            Some(_) => {
                return Err(OrmError::configuration(
                    "max_pool_size requires the `pool` feature",
                ));
            }
            None => PgAdapter::from_url(&self.url)?,
        };
        adapter.connect().await?;
        tracing::debug!(target: "recorm", pooled = self.max_pool_size.is_some(), "database connected");
        Ok(crate::Connection::new(adapter))
    }
}

/// Create a deadpool-postgres pool of at most `max_size` connections.
#[cfg(feature = "pool")]
pub fn create_pool(database_url: &str, max_size: usize) -> OrmResult<deadpool_postgres::Pool> {
    use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};

    let pg_config: tokio_postgres::Config = database_url
        .parse()
        .map_err(|e: tokio_postgres::Error| OrmError::Connection(e.to_string()))?;
    let manager = Manager::from_config(
        pg_config,
        tokio_postgres::NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    Pool::builder(manager)
        .max_size(max_size)
        .build()
        .map_err(|e| OrmError::Pool(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_pool_size() {
        let config = DatabaseConfig::new("postgres://localhost/app").max_pool_size(4);
        assert_eq!(config.url, "postgres://localhost/app");
        assert_eq!(config.max_pool_size, Some(4));
    }

    #[cfg(feature = "pool")]
    #[test]
    fn create_pool_rejects_malformed_url() {
        let err = create_pool("not a url", 2).unwrap_err();
        assert!(matches!(err, OrmError::Connection(_)));
    }
}
