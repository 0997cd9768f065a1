//! Source/target validation before any data is touched.
//!
//! Checks run in a fixed order and stop at the first failing category:
//! identity, loading, URL identity, direction, then connectivity. The
//! local checks always precede network calls.

use super::loader::{Environment, EnvironmentLoader};
use crate::config::resolve_config_file;
use crate::error::{EnvCloneError, mask_url};
use crate::models::EnvironmentClass;
use thiserror::Error;
use tracing::{info, warn};

/// Which side of a clone an environment is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentRole {
    Source,
    Target,
}

impl std::fmt::Display for EnvironmentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

/// A single failed validation check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The named environment could not be loaded
    #[error("{role} environment '{name}' not found or invalid: {reason}")]
    EnvironmentNotFound {
        role: EnvironmentRole,
        name: String,
        reason: String,
    },

    /// Source and target are the same environment
    #[error("Source and target cannot be identical: {reason}")]
    IdenticalEnvironments { reason: String },

    /// Non-production data may never be cloned into production
    #[error("Forbidden: cannot clone from non-production '{from}' into production '{to}'")]
    ForbiddenDirection { from: String, to: String },

    /// The connectivity probe failed
    #[error("Cannot connect to {role} environment '{name}': {message}")]
    Connectivity {
        role: EnvironmentRole,
        name: String,
        message: String,
    },
}

/// Outcome of [`EnvironmentValidator::validate_environments`].
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub source: Option<Environment>,
    pub target: Option<Environment>,
    pub warnings: Vec<String>,
    pub errors: Vec<ValidationError>,
}

/// Both environments after every check passed.
#[derive(Debug, Clone)]
pub struct ValidatedEnvironments {
    pub source: Environment,
    pub target: Environment,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// True when no check failed and both environments resolved.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty() && self.source.is_some() && self.target.is_some()
    }

    /// Converts the report into the validated pair.
    ///
    /// # Errors
    /// Returns `EnvCloneError::Validation` carrying every failed check.
    pub fn into_validated(self) -> crate::Result<ValidatedEnvironments> {
        match (self.source, self.target) {
            (Some(source), Some(target)) if self.errors.is_empty() => Ok(ValidatedEnvironments {
                source,
                target,
                warnings: self.warnings,
            }),
            _ => Err(EnvCloneError::Validation {
                errors: self.errors,
            }),
        }
    }
}

/// Validates clone source and target environments.
#[derive(Debug, Clone)]
pub struct EnvironmentValidator {
    loader: EnvironmentLoader,
}

impl EnvironmentValidator {
    /// Creates a validator loading environments through `loader`.
    pub fn new(loader: EnvironmentLoader) -> Self {
        Self { loader }
    }

    /// The underlying loader.
    pub fn loader(&self) -> &EnvironmentLoader {
        &self.loader
    }

    /// Runs every check for a clone from `source_name` into `target_name`.
    ///
    /// # Example
    /// ```rust,no_run
    /// use envclone_core::environment::{EnvironmentLoader, EnvironmentValidator};
    ///
    /// # async fn example() {
    /// let validator = EnvironmentValidator::new(EnvironmentLoader::new("."));
    /// let report = validator.validate_environments("test", "test").await;
    /// assert!(!report.is_valid());
    /// # }
    /// ```
    pub async fn validate_environments(&self, source_name: &str, target_name: &str) -> ValidationReport {
        let mut report = ValidationReport::default();

        if source_name == target_name
            || resolve_config_file(self.loader.config_dir(), source_name)
                == resolve_config_file(self.loader.config_dir(), target_name)
        {
            report.errors.push(ValidationError::IdenticalEnvironments {
                reason: format!("both resolve to environment '{}'", source_name),
            });
            return report;
        }

        let source = self.load(EnvironmentRole::Source, source_name, &mut report).await;
        let target = self.load(EnvironmentRole::Target, target_name, &mut report).await;
        let (Some(source), Some(target)) = (source, target) else {
            return report;
        };

        if source.url.trim_end_matches('/') == target.url.trim_end_matches('/') {
            report.errors.push(ValidationError::IdenticalEnvironments {
                reason: format!("both point at {}", mask_url(&source.url)),
            });
            return report;
        }

        if source.class != EnvironmentClass::Production && target.class == EnvironmentClass::Production {
            report.errors.push(ValidationError::ForbiddenDirection {
                from: source.name.clone(),
                to: target.name.clone(),
            });
            return report;
        }

        if target.is_protected {
            let warning = format!("Target '{}' is a protected environment", target.name);
            warn!("{}", warning);
            report.warnings.push(warning);
        }

        for (role, environment) in [
            (EnvironmentRole::Source, &source),
            (EnvironmentRole::Target, &target),
        ] {
            if let Err(error) = self.loader.probe(environment).await {
                warn!("Connectivity probe failed for {}: {}", environment.name, error);
                report.errors.push(ValidationError::Connectivity {
                    role,
                    name: environment.name.clone(),
                    message: error.message,
                });
            }
        }

        if report.errors.is_empty() {
            info!("✓ Environments validated: {} -> {}", source.name, target.name);
        }
        report.source = Some(source);
        report.target = Some(target);
        report
    }

    async fn load(
        &self,
        role: EnvironmentRole,
        name: &str,
        report: &mut ValidationReport,
    ) -> Option<Environment> {
        match self.loader.load_environment(name).await {
            Ok(environment) => Some(environment),
            Err(error) => {
                report.errors.push(ValidationError::EnvironmentNotFound {
                    role,
                    name: name.to_string(),
                    reason: error.to_string(),
                });
                None
            }
        }
    }

    /// Renders the source/target summary shown to the operator.
    pub fn summary(source: &Environment, target: &Environment) -> String {
        let protected = |env: &Environment| if env.is_protected { "YES" } else { "NO" };
        let mut lines = vec![
            "ENVIRONMENT SUMMARY".to_string(),
            "=".repeat(50),
            format!("SOURCE: {}", source.name.to_uppercase()),
            format!("   Type: {}", source.class),
            format!("   URL: {}", mask_url(&source.url)),
            format!("   Protected: {}", protected(source)),
            String::new(),
            "   |  CLONE  |".to_string(),
            String::new(),
            format!("TARGET: {}", target.name.to_uppercase()),
            format!("   Type: {}", target.class),
            format!("   URL: {}", mask_url(&target.url)),
            format!("   Protected: {}", protected(target)),
        ];
        if target.is_protected {
            lines.push(String::new());
            lines.push("WARNING: the target is a protected environment!".to_string());
        }
        lines.join("\n")
    }
}
