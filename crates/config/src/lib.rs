//! Layered configuration for kvconf
//!
//! Builds a flattened, case-insensitive key/value view from ordered sources
//! (JSON files, environment variables, command-line switches, in-memory
//! layers). Later sources override earlier ones key by key.
//!
//! Two startup helpers operate on a built [`Configuration`]:
//!
//! - [`project`] copies a flat snapshot into process environment variables.
//! - [`resolve_overrides`] promotes environment-specific keys
//!   (`qa-Database:Host`) to their unprefixed form for the environment named
//!   under `TestEnvironment`.
//!
//! ```ignore
//! use kvconf_config::{ConfigurationBuilder, EnvironmentAliases};
//!
//! let aliases = EnvironmentAliases::new().with_alias("Development", ["dev"]);
//! let config = ConfigurationBuilder::new()
//!     .add_json_file("appsettings.json")
//!     .add_environment_variables(None)
//!     .with_environment_overrides(&aliases)?
//!     .build()?;
//! kvconf_config::project_configuration(&config);
//! ```

mod builder;
mod configuration;
mod env;
mod error;
mod overrides;
mod source;

pub use builder::ConfigurationBuilder;
pub use configuration::{Configuration, KEY_DELIMITER, combine_path, de};
pub use env::{ProjectionReport, project, project_configuration, set_process_var};
pub use error::{ConfigError, Result};
pub use overrides::{
    EnvironmentAliases, OVERRIDES_SOURCE, TEST_ENVIRONMENT_KEY, resolve_override_origins,
    resolve_overrides,
};
pub use source::{
    CommandLineSource, ConfigurationSource, EnvironmentVariablesSource, InMemorySource,
    JsonFileSource, flatten_json,
};
