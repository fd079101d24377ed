//! Backend-specific options handed to the engine alongside the URL.

use indexmap::IndexMap;

/// Key disabling the embedded backend's same-thread restriction.
pub const CHECK_SAME_THREAD: &str = "check_same_thread";

/// Key carrying the client TLS context.
pub const SSL: &str = "ssl";

/// Where certificate roots come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrustStore {
    /// Roots bundled with the TLS stack / provided by the platform.
    #[default]
    Platform,
}

/// Client TLS context handle.
///
/// Only the default trust-store-backed context exists: the peer chain is
/// verified against [`TrustStore::Platform`] and the hostname is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsContext {
    trust_store: TrustStore,
    verify_hostname: bool,
}

impl TlsContext {
    /// Equivalent of a default client context: verified chain and hostname.
    pub fn default_trust_store() -> Self {
        Self {
            trust_store: TrustStore::Platform,
            verify_hostname: true,
        }
    }

    pub fn trust_store(&self) -> TrustStore {
        self.trust_store
    }

    pub fn verifies_hostname(&self) -> bool {
        self.verify_hostname
    }
}

impl Default for TlsContext {
    fn default() -> Self {
        Self::default_trust_store()
    }
}

/// Value stored under a connect-args key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectArg {
    Bool(bool),
    Tls(TlsContext),
}

/// Insertion-ordered option map. Re-inserting a key overwrites its value
/// in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectArgs(IndexMap<String, ConnectArg>);

impl ConnectArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: ConnectArg) -> Option<ConnectArg> {
        self.0.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&ConnectArg> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConnectArg)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Value of `check_same_thread`, if set.
    pub fn check_same_thread(&self) -> Option<bool> {
        match self.get(CHECK_SAME_THREAD) {
            Some(ConnectArg::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    /// TLS context under `ssl`, if set.
    pub fn tls(&self) -> Option<&TlsContext> {
        match self.get(SSL) {
            Some(ConnectArg::Tls(context)) => Some(context),
            _ => None,
        }
    }
}
