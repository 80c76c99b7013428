//! Operator configuration.

use crate::crd::FaultType;
use crate::error::{OperatorError, OperatorResult};
use crate::version;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Images used for derived workloads.
    pub images: ImageSettings,

    /// Interval at which every known spec is re-reconciled, in seconds.
    pub resync_interval_secs: u64,

    /// Resource type registration timing.
    pub registration: RegistrationSettings,

    /// Retry policy for transient reconcile failures.
    pub retry: RetrySettings,
}

/// Where fault images come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    /// Registry and path prefix, e.g. `gcr.io/puppet-panda-dev`.
    pub repository: String,

    /// Tag applied to every fault image.
    pub tag: String,
}

/// Timing of the resource type registration poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationSettings {
    /// Time between availability checks, in milliseconds.
    pub poll_interval_ms: u64,

    /// Upper bound on the whole wait, in milliseconds.
    pub timeout_ms: u64,
}

/// Retry policy for a single notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Delay before retrying a transient failure, in milliseconds.
    pub backoff_ms: u64,

    /// Retries after the first attempt before an add or update waits for the
    /// next resync. Deletes are retried until they succeed.
    pub max_retries: u32,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            images: ImageSettings::default(),
            resync_interval_secs: 300,
            registration: RegistrationSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            repository: version::IMAGE_REPO.to_string(),
            tag: version::VERSION.to_string(),
        }
    }
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 3_000,
            timeout_ms: 30_000,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            backoff_ms: 5_000,
            max_retries: 5,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from a YAML file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> OperatorResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OperatorError::InvalidConfig(format!("Failed to read {}: {e}", path.display()))
        })?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Resync interval as a [`Duration`].
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }
}

impl ImageSettings {
    /// Full image reference for a fault type.
    pub fn image_for(&self, fault: FaultType) -> String {
        format!("{}/{}:{}", self.repository, fault.component(), self.tag)
    }
}

impl RegistrationSettings {
    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl RetrySettings {
    /// Backoff as a [`Duration`].
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = OperatorConfig::default();
        assert_eq!(config.registration.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.registration.timeout(), Duration::from_secs(30));
        assert_eq!(config.resync_interval(), Duration::from_secs(300));
        assert_eq!(config.retry.backoff(), Duration::from_secs(5));
    }

    #[test]
    fn image_reference() {
        let images = ImageSettings {
            repository: "registry.example.com/chaos".to_string(),
            tag: "1.2.3".to_string(),
        };
        assert_eq!(
            images.image_for(FaultType::PodKiller),
            "registry.example.com/chaos/fault-injector-podkiller:1.2.3"
        );
    }

    #[test]
    fn config_roundtrips_through_yaml() {
        let config = OperatorConfig::default();
        let yaml = serde_yaml::to_string(&config).expect("Failed to serialize OperatorConfig");
        let parsed: OperatorConfig =
            serde_yaml::from_str(&yaml).expect("Failed to parse OperatorConfig");
        assert_eq!(parsed.images, config.images);
        assert_eq!(parsed.retry.max_retries, 5);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let parsed: OperatorConfig = serde_yaml::from_str(
            "images:\n  tag: canary\nretry:\n  max_retries: 2\n",
        )
        .expect("Failed to parse OperatorConfig");
        assert_eq!(parsed.images.tag, "canary");
        assert_eq!(parsed.images.repository, version::IMAGE_REPO);
        assert_eq!(parsed.retry.max_retries, 2);
        assert_eq!(parsed.retry.backoff(), Duration::from_secs(5));
        assert_eq!(parsed.resync_interval_secs, 300);
    }

    #[test]
    fn missing_file_is_invalid_config() {
        let err = OperatorConfig::from_file(Path::new("/nonexistent/operator.yaml")).unwrap_err();
        assert!(matches!(err, OperatorError::InvalidConfig(_)));
    }
}
