// src/utils/env.rs
use log::{info, warn};
use std::path::{Path, PathBuf};

pub type EnvOutcome = Result<PathBuf, dotenv::Error>;

/// Loads `.env` from the working directory (or a parent) when present.
/// Variables already set in the process environment win.
///
/// Runs before the logger is initialised so a `RUST_LOG` from the file takes
/// effect; pass the outcome to [`log_env_outcome`] once logging is up.
pub fn load_env() -> EnvOutcome {
    dotenv::dotenv()
}

/// Same as [`load_env`] for an explicit file.
pub fn load_env_from_file(path: &Path) -> EnvOutcome {
    dotenv::from_path(path).map(|_| path.to_path_buf())
}

pub fn log_env_outcome(outcome: &EnvOutcome) {
    match outcome {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(dotenv::Error::Io(_)) => {
            info!("No .env file found, using process environment only")
        }
        Err(e) => warn!("Failed to parse .env file: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    #[test]
    fn test_file_values_visible_without_logger() {
        let path = env::temp_dir().join(format!("property_matching_env_{}.env", std::process::id()));
        fs::write(
            &path,
            "PM_ENV_TEST_LOG_LEVEL=debug\nPM_ENV_TEST_PRESET=from_file\n",
        )
        .unwrap();
        env::set_var("PM_ENV_TEST_PRESET", "from_process");

        let outcome = load_env_from_file(&path);
        log_env_outcome(&outcome);
        assert_eq!(outcome.unwrap(), path);
        assert_eq!(env::var("PM_ENV_TEST_LOG_LEVEL").unwrap(), "debug");
        assert_eq!(env::var("PM_ENV_TEST_PRESET").unwrap(), "from_process");

        fs::remove_file(&path).unwrap();
        env::remove_var("PM_ENV_TEST_LOG_LEVEL");
        env::remove_var("PM_ENV_TEST_PRESET");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let outcome = load_env_from_file(Path::new("/nonexistent/property_matching/.env"));
        assert!(matches!(outcome, Err(dotenv::Error::Io(_))));
        log_env_outcome(&outcome);
    }
}
