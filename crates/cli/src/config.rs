//! The TOML configuration file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use appfuse::EngineConfig;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Directory holding one file per node id.
    pub root: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset, e.g. `"appfuse=debug"`.
    pub log: Option<String>,

    #[serde(default)]
    pub engine: EngineConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appfuse::ForgetPolicy;
    use std::io::Write;

    #[test]
    fn empty_file_uses_defaults() {
        let config = FileConfig::parse("").unwrap();
        assert!(config.root.is_none());
        assert!(config.log.is_none());
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn full_file() {
        let config = FileConfig::parse(
            r#"
            root = "/var/lib/appfuse"
            log = "appfuse=debug"

            [engine]
            max_handles = 64
            attr_timeout_secs = 1
            max_background = 16
            congestion_threshold = 12
            forget = "end-session"
            "#,
        )
        .unwrap();

        assert_eq!(config.root, Some(PathBuf::from("/var/lib/appfuse")));
        assert_eq!(config.log.as_deref(), Some("appfuse=debug"));
        assert_eq!(config.engine.max_handles, 64);
        assert_eq!(config.engine.attr_timeout_secs, 1);
        assert_eq!(config.engine.max_background, 16);
        assert_eq!(config.engine.congestion_threshold, 12);
        assert_eq!(config.engine.forget, ForgetPolicy::EndSession);
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(FileConfig::parse("mountpoint = \"/mnt\"").is_err());
        assert!(FileConfig::parse("[engine]\nmax_write = 4").is_err());
    }

    #[test]
    fn load_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "root = \"/srv\"").unwrap();

        let config = FileConfig::load(file.path()).unwrap();
        assert_eq!(config.root, Some(PathBuf::from("/srv")));
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
