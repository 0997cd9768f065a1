//! Datastore key container with automatic memory zeroing.
//!
//! # Security
//! - Keys are stored in `Zeroizing<T>` containers
//! - Memory is cleared when the credentials go out of scope
//! - Keys never appear in debug output or logs

use zeroize::{Zeroize, Zeroizing};

/// Anonymous and privileged datastore keys for one environment.
///
/// # Example
///
/// ```rust
/// use envclone_core::security::ServiceCredentials;
///
/// let creds = ServiceCredentials::new("anon".to_string(), "service-role".to_string());
/// assert_eq!(creds.service_key(), "service-role");
/// assert!(!format!("{:?}", creds).contains("service-role"));
/// ```
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct ServiceCredentials {
    anon_key: Zeroizing<String>,
    service_key: Zeroizing<String>,
}

impl ServiceCredentials {
    /// Creates credentials; an empty anonymous key means none was configured.
    pub fn new(anon_key: String, service_key: String) -> Self {
        Self {
            anon_key: Zeroizing::new(anon_key),
            service_key: Zeroizing::new(service_key),
        }
    }

    /// Privileged key used for every datastore call.
    pub fn service_key(&self) -> &str {
        &self.service_key
    }

    /// Anonymous-level key (may be empty).
    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    /// Checks if an anonymous key was configured without exposing it.
    pub fn has_anon_key(&self) -> bool {
        !self.anon_key.is_empty()
    }
}

impl std::fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCredentials")
            .field("anon_key", &if self.has_anon_key() { "[REDACTED]" } else { "<none>" })
            .field("service_key", &"[REDACTED]")
            .finish()
    }
}
