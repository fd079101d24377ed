//! Mapping from plain database URL schemes to their async driver variants.

use std::fmt;

/// Database families the service knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackend {
    /// Embedded file-backed database.
    Sqlite,
    /// PostgreSQL server.
    Postgresql,
    /// MySQL / MariaDB server.
    Mysql,
}

impl DatabaseBackend {
    /// Every backend, in the order prefixes are matched.
    pub const ALL: [DatabaseBackend; 3] = [Self::Sqlite, Self::Postgresql, Self::Mysql];

    /// Scheme prefix as users usually write it.
    pub fn plain_prefix(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite://",
            Self::Postgresql => "postgresql://",
            Self::Mysql => "mysql://",
        }
    }

    /// Scheme prefix naming the async driver.
    pub fn driver_prefix(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite+aiosqlite://",
            Self::Postgresql => "postgresql+asyncpg://",
            Self::Mysql => "mysql+aiomysql://",
        }
    }

    /// Database family part of the scheme (`postgresql`, ...).
    pub fn family(&self) -> &'static str {
        self.plain_prefix().trim_end_matches("://")
    }

    /// Identify the backend from a scheme, with or without a `+driver` suffix.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        let family = scheme.split('+').next().unwrap_or(scheme);
        Self::ALL
            .into_iter()
            .find(|backend| backend.family().eq_ignore_ascii_case(family))
    }
}

impl fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.family())
    }
}

/// Rewrite a plain scheme prefix to its driver-qualified form.
///
/// Matching is case-sensitive against the literal start of the string; URLs
/// that are already qualified or use an unknown scheme come back unchanged.
pub fn map_driver_scheme(url: &str) -> String {
    DatabaseBackend::ALL
        .into_iter()
        .find_map(|backend| {
            url.strip_prefix(backend.plain_prefix())
                .map(|rest| format!("{}{}", backend.driver_prefix(), rest))
        })
        .unwrap_or_else(|| url.to_string())
}
