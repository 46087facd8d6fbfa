//! `arbiter check` command implementation.
//!
//! Loads a configuration file, validates it and prints the effective settings
//! after defaults are applied.

use anyhow::{Context, Result};
use arbiter_core::ArbiterConfig;
use std::path::Path;

/// Load and validate the configuration at `path`.
pub fn load(path: &Path) -> Result<ArbiterConfig> {
    let config = ArbiterConfig::from_file(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config in {}", path.display()))?;
    Ok(config)
}

pub fn run(path: &Path) -> Result<()> {
    let config = load(path)?;
    let logger = &config.logger;

    println!("✔ {} is valid", path.display());
    if let Some(project) = &config.project {
        println!("  Project:           {project}");
    }
    println!("  Batch size:        {}", logger.batch_size);
    println!("  Batch timeout:     {} ms", logger.batch_timeout_ms);
    println!(
        "  Retries:           {} (backoff {}..{} ms)",
        logger.max_retries, logger.retry_backoff_ms, logger.max_retry_backoff_ms
    );
    println!(
        "  Remote logging:    {}",
        if logger.enable_remote_logging {
            format!("enabled (topic {})", config.consensus.topic)
        } else {
            "disabled".to_string()
        }
    );
    println!(
        "  Local logging:     {}",
        if logger.enable_local_logging {
            format!("enabled ({})", logger.local_log_path.display())
        } else {
            "disabled".to_string()
        }
    );
    println!("  History retention: {} entries", logger.retention.max_entries);
    if let Some(ttl) = logger.retention.ttl_secs {
        println!("  History TTL:       {ttl} s");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_resolves_relative_log_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("arbiter.yaml");
        fs::write(&path, "logger:\n  batch_size: 5\n  local_log_path: out\n").unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.logger.batch_size, 5);
        assert_eq!(config.logger.local_log_path, dir.path().join("out"));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("arbiter.yaml");
        fs::write(&path, "logger:\n  batch_size: 0\n").unwrap();

        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("invalid config"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        assert!(run(&dir.path().join("missing.yaml")).is_err());
    }
}
