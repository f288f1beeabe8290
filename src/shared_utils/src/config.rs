use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::env::get_env_var_opt;

/// Errors related to locating application configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither an explicit path nor the environment variable was given.
    #[error("no config path given and {0} is not set")]
    MissingEnvVar(String),

    /// The resolved path does not point at a file.
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
}

/// Resolve a config file path.
///
/// An explicit path wins; otherwise the path is read from `env_var`. The result
/// must name an existing file.
pub fn resolve_config_path(
    explicit: Option<&Path>,
    env_var: &str,
) -> Result<PathBuf, ConfigError> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => get_env_var_opt(env_var)
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::MissingEnvVar(env_var.to_string()))?,
    };
    if path.is_file() {
        Ok(path)
    } else {
        Err(ConfigError::NotFound(path))
    }
}

/// Like [`resolve_config_path`], but a missing source is `Ok(None)` instead of an error.
pub fn resolve_optional_config_path(
    explicit: Option<&Path>,
    env_var: &str,
) -> Result<Option<PathBuf>, ConfigError> {
    match resolve_config_path(explicit, env_var) {
        Ok(p) => Ok(Some(p)),
        Err(ConfigError::MissingEnvVar(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    const VAR: &str = "SHARED_UTILS_CONFIG_TEST";

    #[test]
    #[serial]
    fn explicit_path_wins_over_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# empty").unwrap();
        unsafe { std::env::set_var(VAR, "/does/not/exist.toml") };

        let got = resolve_config_path(Some(file.path()), VAR).unwrap();
        assert_eq!(got, file.path());
        unsafe { std::env::remove_var(VAR) };
    }

    #[test]
    #[serial]
    fn env_path_must_exist() {
        unsafe { std::env::set_var(VAR, "/does/not/exist.toml") };
        assert!(matches!(
            resolve_config_path(None, VAR),
            Err(ConfigError::NotFound(_))
        ));
        unsafe { std::env::remove_var(VAR) };
    }

    #[test]
    #[serial]
    fn unset_env_is_optional() {
        unsafe { std::env::remove_var(VAR) };
        assert!(matches!(
            resolve_config_path(None, VAR),
            Err(ConfigError::MissingEnvVar(_))
        ));
        assert_eq!(resolve_optional_config_path(None, VAR).unwrap(), None);
    }
}
