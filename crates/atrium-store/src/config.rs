use std::time::Duration;

use atrium_session::{keys, Session};

use crate::error::StoreResult;
use crate::retry::RetryPolicy;

/// Connection settings derived from the session.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionConfig {
    /// Store URL from `ATRIUM_DB_URL`.
    pub url: String,
    /// Database name from `ATRIUM_DB`.
    pub database: String,
    /// Probe timeout from `ATRIUM_TIMEOUT`.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: keys::default_for(keys::DB_URL)
                .unwrap_or("mongodb://localhost:27017")
                .to_string(),
            database: keys::default_for(keys::DB).unwrap_or("avalon").to_string(),
            timeout: Duration::from_millis(1000),
            retry: RetryPolicy::default(),
        }
    }
}

impl ConnectionConfig {
    /// Read url, database and timeout from `session`. Unset or empty keys
    /// keep their defaults.
    pub fn from_session(session: &Session, retry: RetryPolicy) -> StoreResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            url: session
                .non_empty(keys::DB_URL)
                .map_or(defaults.url, str::to_string),
            database: session
                .non_empty(keys::DB)
                .map_or(defaults.database, str::to_string),
            timeout: session.timeout()?,
            retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_key_table() {
        let config = ConnectionConfig::default();
        assert_eq!(config.url, "mongodb://localhost:27017");
        assert_eq!(config.database, "avalon");
        assert_eq!(config.timeout, Duration::from_millis(1000));
    }

    #[test]
    fn reads_session_values() {
        let session: Session = [
            (keys::DB_URL, "memory://studio"),
            (keys::DB, ""),
            (keys::TIMEOUT, "250"),
        ]
        .into_iter()
        .collect();
        let config = ConnectionConfig::from_session(&session, RetryPolicy::immediate()).unwrap();
        assert_eq!(config.url, "memory://studio");
        assert_eq!(config.database, "avalon");
        assert_eq!(config.timeout, Duration::from_millis(250));
    }

    #[test]
    fn bad_timeout_surfaces_session_error() {
        let session: Session = [(keys::TIMEOUT, "soon")].into_iter().collect();
        assert!(ConnectionConfig::from_session(&session, RetryPolicy::default()).is_err());
    }
}
