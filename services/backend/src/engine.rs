use crate::config::DatabaseConfig;
use crate::connect_args::TlsContext;
use crate::connection::ConnectionConfig;
use crate::driver_scheme::DatabaseBackend;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors raised while opening or using the database
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("unsupported database scheme in '{0}'")]
    UnsupportedScheme(String),

    #[error("invalid database url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Location of an embedded database
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteTarget {
    Memory,
    File(PathBuf),
}

impl SqliteTarget {
    /// Read the target from a `sqlite[+driver]:` URL.
    ///
    /// `sqlite:///relative.db` and `sqlite:////absolute.db` name files;
    /// `sqlite://` and `sqlite:///:memory:` are in-memory.
    pub fn from_url(url: &str) -> Result<Self, DatabaseError> {
        let invalid = |reason: &str| DatabaseError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let (_, rest) = url.split_once(':').ok_or_else(|| invalid("missing scheme"))?;
        let rest = rest.split(['?', '#']).next().unwrap_or(rest);

        if rest.is_empty() || rest == "//" || rest == ":memory:" {
            return Ok(Self::Memory);
        }

        match rest.strip_prefix("///") {
            Some(":memory:") => Ok(Self::Memory),
            Some("") => Err(invalid("empty database path")),
            Some(path) => Ok(Self::File(PathBuf::from(path))),
            None => Err(invalid("expected sqlite:///<path>")),
        }
    }
}

/// URL the driver understands: the `+driver` part of the scheme removed
pub fn driver_url(url: &str, backend: DatabaseBackend) -> String {
    match url.split_once(':') {
        Some((_, rest)) => format!("{}:{}", backend.family(), rest),
        None => url.to_string(),
    }
}

/// Certificate checks the Postgres driver applies for a TLS context
pub fn pg_ssl_mode(tls: &TlsContext) -> PgSslMode {
    if tls.verifies_hostname() {
        PgSslMode::VerifyFull
    } else {
        PgSslMode::VerifyCa
    }
}

/// Connection pool for one of the supported backends
#[derive(Debug, Clone)]
pub enum Database {
    Sqlite(SqlitePool),
    Postgres(PgPool),
    MySql(MySqlPool),
}

impl Database {
    /// Open a pool for the resolved connection settings
    #[instrument(skip_all, fields(url = %config.redacted_url()))]
    pub async fn connect(
        config: &ConnectionConfig,
        settings: &DatabaseConfig,
    ) -> Result<Self, DatabaseError> {
        let backend = config
            .backend()
            .ok_or_else(|| DatabaseError::UnsupportedScheme(config.redacted_url()))?;
        let acquire_timeout = settings.connect_timeout();

        if config.connect_args.check_same_thread().is_some() {
            debug!("check_same_thread has no effect on pooled connections");
        }

        let database = match backend {
            DatabaseBackend::Sqlite => {
                let options = match SqliteTarget::from_url(&config.url)? {
                    SqliteTarget::Memory => SqliteConnectOptions::from_str("sqlite::memory:")?,
                    SqliteTarget::File(path) => SqliteConnectOptions::new()
                        .filename(path)
                        .create_if_missing(true),
                };

                let pool = SqlitePoolOptions::new()
                    .max_connections(settings.max_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect_with(options)
                    .await?;
                Self::Sqlite(pool)
            }
            DatabaseBackend::Postgresql => {
                let mut options =
                    PgConnectOptions::from_str(&driver_url(&config.url, backend))?;
                if let Some(tls) = config.connect_args.tls() {
                    let mode = pg_ssl_mode(tls);
                    debug!(trust_store = ?tls.trust_store(), ssl_mode = ?mode, "Requiring TLS");
                    options = options.ssl_mode(mode);
                }

                let pool = PgPoolOptions::new()
                    .max_connections(settings.max_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect_with(options)
                    .await?;
                Self::Postgres(pool)
            }
            DatabaseBackend::Mysql => {
                let options = MySqlConnectOptions::from_str(&driver_url(&config.url, backend))?;

                let pool = MySqlPoolOptions::new()
                    .max_connections(settings.max_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect_with(options)
                    .await?;
                Self::MySql(pool)
            }
        };

        info!(backend = %backend, "Connected to database");

        Ok(database)
    }

    pub fn backend(&self) -> DatabaseBackend {
        match self {
            Self::Sqlite(_) => DatabaseBackend::Sqlite,
            Self::Postgres(_) => DatabaseBackend::Postgresql,
            Self::MySql(_) => DatabaseBackend::Mysql,
        }
    }

    /// Round-trip a trivial query (for readiness checks)
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        match self {
            Self::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ())?,
            Self::Postgres(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ())?,
            Self::MySql(pool) => sqlx::query("SELECT 1").execute(pool).await.map(|_| ())?,
        }
        Ok(())
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        match self {
            Self::Sqlite(pool) => pool.close().await,
            Self::Postgres(pool) => pool.close().await,
            Self::MySql(pool) => pool.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvSnapshot;
    use crate::connection::resolve;

    #[test]
    fn test_sqlite_targets() {
        assert_eq!(
            SqliteTarget::from_url("sqlite+aiosqlite:////tmp/presenton/fastapi.db").unwrap(),
            SqliteTarget::File(PathBuf::from("/tmp/presenton/fastapi.db"))
        );
        assert_eq!(
            SqliteTarget::from_url("sqlite+aiosqlite:///data/app.db").unwrap(),
            SqliteTarget::File(PathBuf::from("data/app.db"))
        );
        assert_eq!(SqliteTarget::from_url("sqlite://").unwrap(), SqliteTarget::Memory);
        assert_eq!(
            SqliteTarget::from_url("sqlite+aiosqlite:///:memory:").unwrap(),
            SqliteTarget::Memory
        );
        assert!(SqliteTarget::from_url("sqlite+aiosqlite://host/app.db").is_err());
    }

    #[test]
    fn test_driver_url_drops_driver_suffix() {
        assert_eq!(
            driver_url("postgresql+asyncpg://u:p@h/db", DatabaseBackend::Postgresql),
            "postgresql://u:p@h/db"
        );
        assert_eq!(
            driver_url("mysql+aiomysql://u:p@h/db", DatabaseBackend::Mysql),
            "mysql://u:p@h/db"
        );
    }

    #[test]
    fn test_default_tls_context_verifies_full_chain() {
        assert!(matches!(
            pg_ssl_mode(&TlsContext::default_trust_store()),
            PgSslMode::VerifyFull
        ));
    }

    #[tokio::test]
    async fn test_connect_unknown_scheme() {
        let config = resolve(&EnvSnapshot {
            database_url: Some("mssql://u:p@h/db".to_string()),
            ..Default::default()
        });

        let result = Database::connect(&config, &DatabaseConfig::default()).await;
        assert!(matches!(result, Err(DatabaseError::UnsupportedScheme(_))));
    }

    #[tokio::test]
    async fn test_connect_default_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = resolve(&EnvSnapshot {
            app_data_directory: Some(dir.path().to_string_lossy().into_owned()),
            ..Default::default()
        });

        let database = Database::connect(&config, &DatabaseConfig::default())
            .await
            .unwrap();

        assert_eq!(database.backend(), DatabaseBackend::Sqlite);
        database.ping().await.unwrap();
        assert!(dir.path().join("fastapi.db").exists());
        database.close().await;
    }
}
