pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{PollSettings, RetrySettings, Settings};

use std::path::{Path, PathBuf};

const CANDIDATES: [&str; 2] = ["reconflow.local.yaml", "reconflow.yaml"];

/// Global config directory (`~/.config/reconflow`)
pub fn get_config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("reconflow"))
}

/// Locate the settings file
///
/// Search order:
/// 1. `RECONFLOW_CONFIG_PATH` (must exist when set)
/// 2. Current directory: reconflow.local.yaml, reconflow.yaml
/// 3. `./.reconflow/`, same names
/// 4. `~/.config/reconflow/reconflow.yaml`
///
/// `Ok(None)` means no file exists and defaults apply.
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var("RECONFLOW_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::ConfigFileNotFound(path));
    }

    let current_dir = std::env::current_dir()?;
    for dir in [current_dir.clone(), current_dir.join(".reconflow")] {
        for filename in &CANDIDATES {
            let path = dir.join(filename);
            if path.exists() {
                return Ok(Some(path));
            }
        }
    }

    if let Ok(config_dir) = get_config_dir() {
        let global_config = config_dir.join("reconflow.yaml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// Load settings from an explicit path, or discover them
pub fn load(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) if path.exists() => Settings::load(path),
        Some(path) => Err(ConfigError::ConfigFileNotFound(path.to_path_buf())),
        None => load_default(),
    }
}

/// Discovered settings, or defaults when no file exists
pub fn load_default() -> Result<Settings> {
    match find_config_file()? {
        Some(path) => Settings::load(&path),
        None => {
            tracing::debug!("No config file found, using defaults");
            Ok(Settings::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn in_dir<R>(dir: &Path, f: impl FnOnce() -> R) -> R {
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        let result = temp_env::with_var_unset("RECONFLOW_CONFIG_PATH", f);
        std::env::set_current_dir(original_dir).unwrap();
        result
    }

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("reconflow"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("reconflow.yaml"), "{}").unwrap();

        let found = in_dir(temp_dir.path(), find_config_file).unwrap();

        assert!(found.unwrap().ends_with("reconflow.yaml"));
    }

    #[test]
    #[serial]
    fn test_local_file_takes_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("reconflow.yaml"), "{}").unwrap();
        fs::write(temp_dir.path().join("reconflow.local.yaml"), "{}").unwrap();

        let found = in_dir(temp_dir.path(), find_config_file).unwrap();

        assert!(found.unwrap().ends_with("reconflow.local.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_dot_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dot_dir = temp_dir.path().join(".reconflow");
        fs::create_dir(&dot_dir).unwrap();
        fs::write(dot_dir.join("reconflow.yaml"), "{}").unwrap();

        let found = in_dir(temp_dir.path(), find_config_file).unwrap();

        assert!(found.unwrap().ends_with(".reconflow/reconflow.yaml"));
    }

    #[test]
    #[serial]
    fn test_env_var_overrides_discovery() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "token_env: CUSTOM_TOKEN\n").unwrap();

        let settings = temp_env::with_var("RECONFLOW_CONFIG_PATH", Some(&config_path), || {
            assert_eq!(find_config_file().unwrap(), Some(config_path.clone()));
            load_default().unwrap()
        });

        assert_eq!(settings.token_env, "CUSTOM_TOKEN");
    }

    #[test]
    #[serial]
    fn test_env_var_pointing_nowhere_is_an_error() {
        let result = temp_env::with_var(
            "RECONFLOW_CONFIG_PATH",
            Some("/nonexistent/reconflow.yaml"),
            find_config_file,
        );
        assert!(matches!(result, Err(ConfigError::ConfigFileNotFound(_))));
    }

    #[test]
    #[serial]
    fn test_explicit_path_must_exist() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("missing.yaml");

        assert!(matches!(
            load(Some(&missing)),
            Err(ConfigError::ConfigFileNotFound(_))
        ));
    }

    #[test]
    #[serial]
    fn test_invalid_yaml_names_the_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("reconflow.yaml");
        fs::write(&path, "poll: [1, 2").unwrap();

        let err = load(Some(&path)).unwrap_err();

        assert!(err.to_string().contains("reconflow.yaml"));
    }
}
