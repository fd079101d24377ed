//! Lossless splitting of connection URLs into their generic components.
//!
//! Parsing into a full [`url::Url`] would re-serialize the string (case,
//! percent-encoding, empty hosts), so the split works on the raw text and
//! only the query is ever removed when reassembling. The exceptions are
//! leading control characters and embedded tab, CR and LF, which are
//! removed before splitting.

use std::fmt;
use std::net::Ipv6Addr;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

/// Reasons a URL cannot be split
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlSplitError {
    #[error("unbalanced brackets in authority '{0}'")]
    UnbalancedBrackets(String),

    #[error("invalid bracketed host '{host}': {reason}")]
    InvalidBracketedHost { host: String, reason: &'static str },

    #[error("authority '{0}' contains invalid characters under NFKC normalization")]
    InvalidNetloc(String),
}

/// `scheme://authority/path?query#fragment`, split without normalization
/// other than lowercasing the scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitUrl {
    /// Lowercased scheme, empty when none was recognized
    pub scheme: String,
    /// Text between `//` and the path; `Some("")` for `scheme:///path`
    pub authority: Option<String>,
    pub path: String,
    /// Raw query without the `?`
    pub query: String,
    /// Raw fragment without the `#`
    pub fragment: String,
}

impl SplitUrl {
    pub fn parse(url: &str) -> Result<Self, UrlSplitError> {
        let cleaned: String = url
            .trim_start_matches(|c: char| c <= ' ')
            .chars()
            .filter(|c| !matches!(c, '\t' | '\r' | '\n'))
            .collect();

        let (scheme, mut rest) = match split_scheme(&cleaned) {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => (String::new(), cleaned.as_str()),
        };

        let mut authority = None;
        if let Some(after_slashes) = rest.strip_prefix("//") {
            let end = after_slashes
                .find(['/', '?', '#'])
                .unwrap_or(after_slashes.len());
            let netloc = &after_slashes[..end];
            check_brackets(netloc)?;
            check_nfkc(netloc)?;
            authority = Some(netloc.to_string());
            rest = &after_slashes[end..];
        }

        let (rest, fragment) = rest.split_once('#').unwrap_or((rest, ""));
        let (path, query) = rest.split_once('?').unwrap_or((rest, ""));

        Ok(Self {
            scheme,
            authority,
            path: path.to_string(),
            query: query.to_string(),
            fragment: fragment.to_string(),
        })
    }

    /// Decoded `key=value` pairs in order, blank values kept.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Reassemble the URL with the query component removed.
    pub fn without_query(&self) -> String {
        Self {
            query: String::new(),
            ..self.clone()
        }
        .to_string()
    }
}

impl fmt::Display for SplitUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.scheme.is_empty() {
            write!(f, "{}:", self.scheme)?;
        }
        if let Some(authority) = &self.authority {
            write!(f, "//{authority}")?;
            if !self.path.is_empty() && !self.path.starts_with('/') {
                f.write_str("/")?;
            }
        }
        f.write_str(&self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        if !self.fragment.is_empty() {
            write!(f, "#{}", self.fragment)?;
        }
        Ok(())
    }
}

/// Outcome of stripping the query string from a connection URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanitizedUrl {
    /// The URL split cleanly. `query` holds the pairs that were removed
    /// (empty when there was no query).
    Parsed {
        url: String,
        scheme: String,
        query: Vec<(String, String)>,
    },
    /// The URL could not be split and is returned untouched.
    Unparsed { url: String, error: UrlSplitError },
}

impl SanitizedUrl {
    pub fn into_url(self) -> String {
        match self {
            Self::Parsed { url, .. } | Self::Unparsed { url, .. } => url,
        }
    }
}

/// Split `url` and drop its query string.
///
/// A URL without a query (or with an empty one) is returned as given.
pub fn sanitize_query(url: &str) -> SanitizedUrl {
    match SplitUrl::parse(url) {
        Ok(split) if split.query.is_empty() => SanitizedUrl::Parsed {
            url: url.to_string(),
            scheme: split.scheme,
            query: Vec::new(),
        },
        Ok(split) => SanitizedUrl::Parsed {
            url: split.without_query(),
            query: split.query_pairs(),
            scheme: split.scheme,
        },
        Err(error) => SanitizedUrl::Unparsed {
            url: url.to_string(),
            error,
        },
    }
}

fn split_scheme(url: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = url.split_once(':')?;
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

fn check_brackets(netloc: &str) -> Result<(), UrlSplitError> {
    let open = netloc.contains('[');
    let close = netloc.contains(']');
    if open != close {
        return Err(UrlSplitError::UnbalancedBrackets(netloc.to_string()));
    }
    if !open {
        return Ok(());
    }

    let after_open = netloc.split_once('[').map(|(_, r)| r).unwrap_or("");
    let host = after_open.split_once(']').map(|(h, _)| h).unwrap_or(after_open);
    check_bracketed_host(host)
}

fn check_bracketed_host(host: &str) -> Result<(), UrlSplitError> {
    let invalid = |reason| UrlSplitError::InvalidBracketedHost {
        host: host.to_string(),
        reason,
    };

    // IPvFuture: v<hex>.<anything>
    if let Some(future) = host.strip_prefix('v') {
        let (version, address) = future
            .split_once('.')
            .ok_or_else(|| invalid("IPvFuture address is invalid"))?;
        let valid = !version.is_empty()
            && version.chars().all(|c| c.is_ascii_hexdigit())
            && !address.is_empty();
        return if valid {
            Ok(())
        } else {
            Err(invalid("IPvFuture address is invalid"))
        };
    }

    let address = match host.split_once('%') {
        Some((_, scope)) if scope.is_empty() || scope.contains('%') => {
            return Err(invalid("invalid IPv6 scope id"));
        }
        Some((address, _)) => address,
        None => host,
    };

    address
        .parse::<Ipv6Addr>()
        .map(|_| ())
        .map_err(|_| invalid("not an IPv6 address"))
}

/// Reject a non-ASCII authority whose NFKC form introduces URL delimiters.
fn check_nfkc(netloc: &str) -> Result<(), UrlSplitError> {
    if netloc.is_ascii() {
        return Ok(());
    }

    let stripped: String = netloc
        .chars()
        .filter(|c| !matches!(c, '@' | ':' | '#' | '?'))
        .collect();
    let normalized: String = stripped.nfkc().collect();
    if normalized != stripped && normalized.contains(['/', '?', '#', '@', ':']) {
        return Err(UrlSplitError::InvalidNetloc(netloc.to_string()));
    }
    Ok(())
}
