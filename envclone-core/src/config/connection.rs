//! Datastore client connection settings.

use std::time::Duration;

/// Timeouts and limits applied by every datastore backend.
///
/// # Example
/// ```rust
/// use envclone_core::config::ConnectionSettings;
/// use std::time::Duration;
///
/// let settings = ConnectionSettings::default().with_request_timeout(Duration::from_secs(5));
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Timeout for a single request or statement
    pub request_timeout: Duration,
    /// Maximum pooled connections (SQL backend)
    pub max_connections: u32,
    /// Rows fetched per page when reading a whole table
    pub page_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            max_connections: 5,
            page_size: 1000,
        }
    }
}

impl ConnectionSettings {
    /// Builder method to set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builder method to set the page size for full-table reads.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Validates the settings.
    ///
    /// # Errors
    /// Returns a configuration error for zero timeouts, pool size or page size.
    pub fn validate(&self) -> crate::Result<()> {
        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(crate::error::EnvCloneError::configuration(
                "Timeouts must be greater than zero",
            ));
        }
        if self.max_connections == 0 {
            return Err(crate::error::EnvCloneError::configuration(
                "max_connections must be greater than zero",
            ));
        }
        if self.page_size == 0 {
            return Err(crate::error::EnvCloneError::configuration(
                "page_size must be greater than zero",
            ));
        }
        Ok(())
    }
}
