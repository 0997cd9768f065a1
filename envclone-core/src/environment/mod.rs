//! Environment loading and validation.
//!
//! - `loader`: reads an environment's configuration and connects its client
//! - `validator`: source/target checks run before any clone

mod loader;
mod validator;

pub use loader::{DEFAULT_PROBE_TABLE, Environment, EnvironmentLoader};
pub use validator::{
    EnvironmentRole, EnvironmentValidator, ValidatedEnvironments, ValidationError, ValidationReport,
};
