//! Presenton Backend
//!
//! HTTP backend for the Presenton presentation generator. The service
//! resolves its database connection from loosely formatted environment
//! values, serves the application data directory, exposes image-provider
//! settings and publishes exported files to a public object store.
//!
//! ## Database resolution
//!
//! ```text
//! DATABASE_URL ──▶ normalize ──┬─ absent ──▶ sqlite:///<APP_DATA_DIRECTORY>/fastapi.db
//!                              │                           │
//!                              └─ present ─────────────────┤
//!                                                          ▼
//!                                                  map driver scheme
//!                                                          │
//!                                                          ▼
//!                                      connect args + strip query string
//!                                                          │
//!                                                          ▼
//!                                       ConnectionConfig { url, connect_args }
//! ```

pub mod api;
pub mod config;
pub mod connect_args;
pub mod connection;
pub mod driver_scheme;
pub mod engine;
pub mod image_provider;
pub mod object_storage;
pub mod url_split;

pub use api::AppState;
pub use config::{normalize_env_value, Config, EnvSnapshot};
pub use connect_args::{ConnectArg, ConnectArgs, TlsContext};
pub use connection::{resolve, resolve_detailed, ConnectionConfig, Resolution};
pub use driver_scheme::{map_driver_scheme, DatabaseBackend};
pub use engine::{Database, DatabaseError};
pub use image_provider::{ImageProvider, ImageProviderError};
pub use object_storage::{ObjectStore, Publisher, S3ObjectStore, StorageError};
pub use url_split::{SanitizedUrl, SplitUrl, UrlSplitError};
