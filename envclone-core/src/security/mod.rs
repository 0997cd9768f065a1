//! Security policy and confirmation gate for destructive operations.
//!
//! This module provides:
//! - Production access policy (`SecurityManager::validate_production_access`)
//! - The interactive double-confirmation protocol
//! - Audit summaries and operation ids
//! - Datastore key storage with automatic memory zeroing
//!
//! # Security Guarantees
//! - A production target is never authorized without double confirmation
//! - Confirmation keywords are matched exactly and case-sensitively
//! - Keys are stored in `Zeroizing` containers and redacted from debug output
//!
//! # Module Structure
//! - `credentials`: key container with automatic memory zeroing
//! - `prompt`: operator prompt capability (terminal and scripted)

mod credentials;
mod prompt;

pub use credentials::ServiceCredentials;
pub use prompt::{Prompt, ScriptedPrompt, TerminalPrompt};

use crate::models::EnvironmentClass;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Literal answer required at the first confirmation step.
pub const AFFIRMATIVE_TOKEN: &str = "YES";
/// Keyword required to confirm a clone.
pub const CLONE_KEYWORD: &str = "CONFIRM";
/// Keyword required to confirm a restore.
pub const RESTORE_KEYWORD: &str = "RESTORE";

const PRODUCTION_KEYWORDS: &[&str] = &["PRODUCTION", "PROD"];
const GENERAL_KEYWORDS: &[&str] = &["CONFIRMER", "CONFIRM"];
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const BANNER_WIDTH: usize = 60;

/// Outcome of the production access policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityValidation {
    /// False means "not yet authorized": confirmation is required
    pub is_valid: bool,
    pub message: String,
    pub requires_backup: bool,
}

/// Parameters of one double-confirmation exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationOptions {
    pub operation: String,
    pub environment: String,
    pub consequences: Vec<String>,
    pub keyword: String,
}

/// Audit classification of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SecurityLevel {
    Critical,
    Standard,
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::Standard => write!(f, "STANDARD"),
        }
    }
}

/// Keyword family accepted by [`SecurityManager::validate_confirmation_keyword`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordKind {
    Production,
    General,
}

/// Audit record for a security decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySummary {
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    pub environment: String,
    pub is_production: bool,
    pub confirmed: bool,
    pub security_level: SecurityLevel,
    pub operation_id: String,
}

/// Policy and confirmation gate.
///
/// Stateless apart from the prompt capability used to talk to the operator.
#[derive(Clone)]
pub struct SecurityManager {
    prompt: Arc<dyn Prompt>,
}

impl std::fmt::Debug for SecurityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityManager").finish_non_exhaustive()
    }
}

impl SecurityManager {
    /// Creates a manager that confirms through `prompt`.
    pub fn new(prompt: Arc<dyn Prompt>) -> Self {
        Self { prompt }
    }

    /// The prompt used for confirmations and banners.
    pub fn prompt(&self) -> &Arc<dyn Prompt> {
        &self.prompt
    }

    /// True for environment names classed as production.
    pub fn is_production_environment(environment: &str) -> bool {
        EnvironmentClass::from_name(environment).is_protected()
    }

    /// Evaluates whether `operation` may run against `target_env`.
    ///
    /// Non-production targets are authorized outright. A production target
    /// is always reported as not yet authorized with a mandatory backup.
    pub fn validate_production_access(&self, operation: &str, target_env: &str) -> SecurityValidation {
        if !Self::is_production_environment(target_env) {
            return SecurityValidation {
                is_valid: true,
                message: format!("Operation authorized on environment {}", target_env),
                requires_backup: false,
            };
        }

        warn!(
            "Production environment detected: {} on {}",
            operation,
            target_env.to_uppercase()
        );
        SecurityValidation {
            is_valid: false,
            message: "Production operation detected - confirmation required".to_string(),
            requires_backup: true,
        }
    }

    /// Runs the two-step confirmation protocol.
    ///
    /// Step one requires the literal [`AFFIRMATIVE_TOKEN`]; step two requires
    /// `options.keyword` exactly. Answers are compared byte for byte, so
    /// surrounding whitespace or a different case cancels. End of input at
    /// either step counts as cancellation.
    ///
    /// # Errors
    /// Returns a prompt error only if the operator input cannot be read.
    pub async fn request_double_confirmation(&self, options: &ConfirmationOptions) -> crate::Result<bool> {
        self.prompt.show(&Self::render_security_warning(
            &options.environment,
            &options.operation,
            &options.consequences,
        ));

        let first = self
            .prompt
            .ask(&format!(
                "Do you really want to continue? (type {}): ",
                AFFIRMATIVE_TOKEN
            ))
            .await?;
        if first.as_deref() != Some(AFFIRMATIVE_TOKEN) {
            info!("Operation cancelled by operator");
            return Ok(false);
        }

        let keyword = self
            .prompt
            .ask_secret(&format!("To confirm, type \"{}\" in capitals: ", options.keyword))
            .await?;
        if keyword.as_deref() != Some(options.keyword.as_str()) {
            warn!(
                "Incorrect confirmation keyword (expected \"{}\"); operation cancelled",
                options.keyword
            );
            return Ok(false);
        }

        info!("✓ Double confirmation accepted");
        Ok(true)
    }

    /// Renders the warning shown before confirmation: a boxed banner for
    /// production, a short notice otherwise.
    pub fn render_security_warning(environment: &str, operation: &str, consequences: &[String]) -> String {
        let mut lines = Vec::new();
        if Self::is_production_environment(environment) {
            let border = "█".repeat(BANNER_WIDTH);
            let inner = BANNER_WIDTH.saturating_sub(4);
            let boxed = |text: &str| format!("█ {:<inner$} █", text, inner = inner);

            lines.push(String::new());
            lines.push("DANGER - PRODUCTION ENVIRONMENT".to_string());
            lines.push(border.clone());
            lines.push(boxed("WARNING"));
            lines.push(boxed(""));
            lines.push(boxed(&format!("Operation: {}", operation)));
            lines.push(boxed(&format!("Environment: {}", environment.to_uppercase())));
            lines.push(boxed(""));
            lines.push(boxed("CONSEQUENCES OF THIS OPERATION:"));
            for consequence in consequences {
                lines.push(boxed(&format!("• {}", consequence)));
            }
            lines.push(boxed(""));
            lines.push(boxed("THIS ACTION IS IRREVERSIBLE"));
            lines.push(border);
        } else {
            lines.push(String::new());
            lines.push(format!("Operation on environment: {}", environment.to_uppercase()));
            lines.push(format!("Action: {}", operation));
            lines.push("Consequences:".to_string());
            for consequence in consequences {
                lines.push(format!("   • {}", consequence));
            }
        }
        lines.join("\n")
    }

    /// Checks a keyword against a keyword family, case-insensitively.
    pub fn validate_confirmation_keyword(keyword: &str, kind: KeywordKind) -> bool {
        let upper = keyword.to_uppercase();
        let accepted = match kind {
            KeywordKind::Production => PRODUCTION_KEYWORDS,
            KeywordKind::General => GENERAL_KEYWORDS,
        };
        accepted.contains(&upper.as_str())
    }

    /// Generates a unique operation id: `op_<millis>_<9 base36 chars>`.
    pub fn generate_operation_id() -> String {
        let mut rng = rand::rng();
        let suffix: String = (0..9)
            .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
            .collect();
        format!("op_{}_{}", Utc::now().timestamp_millis(), suffix)
    }

    /// Builds the audit record for a security decision.
    pub fn create_security_summary(operation: &str, environment: &str, confirmed: bool) -> SecuritySummary {
        let is_production = Self::is_production_environment(environment);
        SecuritySummary {
            timestamp: Utc::now(),
            operation: operation.to_string(),
            environment: environment.to_string(),
            is_production,
            confirmed,
            security_level: if is_production {
                SecurityLevel::Critical
            } else {
                SecurityLevel::Standard
            },
            operation_id: Self::generate_operation_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(keyword: &str) -> ConfirmationOptions {
        ConfirmationOptions {
            operation: "clone test -> prod".to_string(),
            environment: "prod".to_string(),
            consequences: vec!["All target data will be replaced".to_string()],
            keyword: keyword.to_string(),
        }
    }

    async fn confirm(answers: &[&str], keyword: &str) -> bool {
        let prompt = Arc::new(ScriptedPrompt::new(answers.iter().copied()));
        let manager = SecurityManager::new(prompt);
        manager
            .request_double_confirmation(&options(keyword))
            .await
            .unwrap()
    }

    #[test]
    fn test_production_access_policy() {
        let manager = SecurityManager::new(Arc::new(ScriptedPrompt::default()));

        let dev = manager.validate_production_access("clone", "dev");
        assert!(dev.is_valid);
        assert!(!dev.requires_backup);

        let prod = manager.validate_production_access("clone", "production");
        assert!(!prod.is_valid);
        assert!(prod.requires_backup);
    }

    #[tokio::test]
    async fn test_double_confirmation_accepts_exact_answers() {
        assert!(confirm(&["YES", "CONFIRM"], CLONE_KEYWORD).await);
        assert!(confirm(&["YES", "RESTORE"], RESTORE_KEYWORD).await);
    }

    #[tokio::test]
    async fn test_double_confirmation_rejects_padded_answers() {
        assert!(!confirm(&[" YES ", "\tCONFIRM  "], CLONE_KEYWORD).await);
        assert!(!confirm(&["YES ", "CONFIRM"], CLONE_KEYWORD).await);
        assert!(!confirm(&["YES", "CONFIRM\n"], CLONE_KEYWORD).await);
    }

    #[tokio::test]
    async fn test_double_confirmation_rejects_anything_else() {
        assert!(!confirm(&["yes", "CONFIRM"], CLONE_KEYWORD).await);
        assert!(!confirm(&["Y", "CONFIRM"], CLONE_KEYWORD).await);
        assert!(!confirm(&["YES", "confirm"], CLONE_KEYWORD).await);
        assert!(!confirm(&["YES", "CONFIRMER"], CLONE_KEYWORD).await);
        assert!(!confirm(&["YES"], CLONE_KEYWORD).await);
        assert!(!confirm(&[], CLONE_KEYWORD).await);
    }

    #[tokio::test]
    async fn test_first_refusal_skips_keyword_step() {
        let prompt = Arc::new(ScriptedPrompt::new(["no", "CONFIRM"]));
        let manager = SecurityManager::new(prompt.clone());
        assert!(
            !manager
                .request_double_confirmation(&options(CLONE_KEYWORD))
                .await
                .unwrap()
        );
        assert_eq!(prompt.remaining(), 1);
    }

    #[test]
    fn test_keyword_families() {
        assert!(SecurityManager::validate_confirmation_keyword("prod", KeywordKind::Production));
        assert!(SecurityManager::validate_confirmation_keyword("PRODUCTION", KeywordKind::Production));
        assert!(SecurityManager::validate_confirmation_keyword("Confirmer", KeywordKind::General));
        assert!(!SecurityManager::validate_confirmation_keyword("CONFIRM", KeywordKind::Production));
        assert!(!SecurityManager::validate_confirmation_keyword("yes", KeywordKind::General));
    }

    #[test]
    fn test_operation_id_format() {
        let id = SecurityManager::generate_operation_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "op");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_ne!(id, SecurityManager::generate_operation_id());
    }

    #[test]
    fn test_security_summary_levels() {
        let summary = SecurityManager::create_security_summary("clone", "prod", true);
        assert!(summary.is_production);
        assert_eq!(summary.security_level, SecurityLevel::Critical);

        let summary = SecurityManager::create_security_summary("clone", "test", false);
        assert_eq!(summary.security_level, SecurityLevel::Standard);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["securityLevel"], "STANDARD");
        assert!(json["operationId"].as_str().unwrap().starts_with("op_"));
    }

    #[test]
    fn test_warning_banner_variants() {
        let consequences = vec!["Target tables wiped".to_string()];
        let prod = SecurityManager::render_security_warning("prod", "clone", &consequences);
        assert!(prod.contains("PRODUCTION ENVIRONMENT"));
        assert!(prod.contains("• Target tables wiped"));

        let dev = SecurityManager::render_security_warning("dev", "clone", &consequences);
        assert!(dev.contains("Operation on environment: DEV"));
        assert!(!dev.contains("IRREVERSIBLE"));
    }
}
