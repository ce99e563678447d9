//! Process environment projection.
//!
//! Writes configuration values into the process-wide environment table.
//! Callers must do this during single-threaded startup: the environment is
//! shared by every thread and nothing here takes a lock.

use crate::configuration::Configuration;
use crate::error::{ConfigError, Result};

/// Set a process environment variable.
///
/// Names that are blank or contain `=` or NUL, and values that contain NUL,
/// cannot be represented by the OS and are refused.
pub fn set_process_var(name: &str, value: &str) -> Result<()> {
    let reason = if name.trim().is_empty() {
        Some("name is blank")
    } else if name.contains('=') {
        Some("name contains '='")
    } else if name.contains('\0') {
        Some("name contains a NUL character")
    } else if value.contains('\0') {
        Some("value contains a NUL character")
    } else {
        None
    };
    if let Some(reason) = reason {
        return Err(ConfigError::InvalidEnvironmentVariable {
            name: name.to_string(),
            reason,
        });
    }

    // SAFETY: environment writes happen during startup before worker threads
    // read the environment; concurrent startup paths are unsupported.
    #[allow(unsafe_code)]
    unsafe {
        std::env::set_var(name, value);
    }
    Ok(())
}

/// Outcome of an environment projection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionReport {
    /// Variables that were written.
    pub applied: usize,
    /// Entries skipped because their key cannot name a variable.
    pub skipped: usize,
}

/// Copy a flat snapshot into process environment variables.
///
/// Blank keys are skipped; blank values are still written. When a key repeats
/// the last value wins.
pub fn project<'a, I>(snapshot: I) -> ProjectionReport
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut report = ProjectionReport::default();
    for (key, value) in snapshot {
        if key.trim().is_empty() {
            report.skipped += 1;
            continue;
        }
        match set_process_var(key, value) {
            Ok(()) => report.applied += 1,
            Err(e) => {
                tracing::warn!(key, error = %e, "Skipping configuration entry");
                report.skipped += 1;
            }
        }
    }
    tracing::debug!(
        applied = report.applied,
        skipped = report.skipped,
        "Projected configuration into environment"
    );
    report
}

/// Project every entry of a built configuration.
pub fn project_configuration(config: &Configuration) -> ProjectionReport {
    project(config.iter())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_skips_blank_keys() {
        temp_env::with_vars_unset(["KVCONF_PROJ_A", "KVCONF_PROJ_B"], || {
            let report = project([("KVCONF_PROJ_A", "1"), ("", "2"), ("KVCONF_PROJ_B", "")]);

            assert_eq!(report, ProjectionReport { applied: 2, skipped: 1 });
            assert_eq!(std::env::var("KVCONF_PROJ_A").unwrap(), "1");
            assert_eq!(std::env::var("KVCONF_PROJ_B").unwrap(), "");
        });
    }

    #[test]
    fn test_projection_last_write_wins() {
        temp_env::with_var_unset("KVCONF_PROJ_DUP", || {
            project([("KVCONF_PROJ_DUP", "first"), ("KVCONF_PROJ_DUP", "second")]);
            assert_eq!(std::env::var("KVCONF_PROJ_DUP").unwrap(), "second");
        });
    }

    #[test]
    fn test_whitespace_key_is_skipped() {
        let report = project([("   ", "x")]);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.applied, 0);
    }

    #[test]
    fn test_set_process_var_rejects_unrepresentable() {
        assert!(matches!(
            set_process_var("A=B", "x"),
            Err(ConfigError::InvalidEnvironmentVariable { .. })
        ));
        assert!(matches!(
            set_process_var("KVCONF_NUL", "a\0b"),
            Err(ConfigError::InvalidEnvironmentVariable { .. })
        ));
        assert!(set_process_var("", "x").is_err());
    }

    #[test]
    fn test_project_configuration() {
        temp_env::with_var_unset("KVCONF_PROJ_CFG", || {
            let config = crate::ConfigurationBuilder::new()
                .add_in_memory("test", [("KVCONF_PROJ_CFG", "value")])
                .build()
                .unwrap();
            let report = project_configuration(&config);
            assert_eq!(report.applied, 1);
            assert_eq!(std::env::var("KVCONF_PROJ_CFG").unwrap(), "value");
        });
    }
}
