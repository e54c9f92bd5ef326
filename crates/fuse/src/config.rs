//! Engine configuration.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::handle::DEFAULT_MAX_HANDLES;

const MAX_ATTR_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// What to do when the kernel sends FORGET.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForgetPolicy {
    /// Drop the notification and keep serving.
    #[default]
    Ignore,
    /// Treat the notification as the end of the session.
    EndSession,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum number of simultaneously open handles.
    pub max_handles: usize,
    /// Validity of entries and attributes handed to the kernel.
    pub attr_timeout_secs: u64,
    pub max_background: u16,
    pub congestion_threshold: u16,
    pub forget: ForgetPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_handles: DEFAULT_MAX_HANDLES,
            attr_timeout_secs: 10,
            max_background: 32,
            congestion_threshold: 32,
            forget: ForgetPolicy::Ignore,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_handles == 0 {
            return Err(Error::InvalidConfig(
                "max_handles must be at least 1".to_string(),
            ));
        }
        if self.max_handles as u64 > u32::MAX as u64 {
            return Err(Error::InvalidConfig(format!(
                "max_handles cannot exceed {}",
                u32::MAX
            )));
        }
        if self.attr_timeout_secs > MAX_ATTR_TIMEOUT_SECS {
            return Err(Error::InvalidConfig(format!(
                "attr_timeout_secs cannot exceed {MAX_ATTR_TIMEOUT_SECS}"
            )));
        }
        Ok(())
    }
}
