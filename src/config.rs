use std::path::PathBuf;
use std::time::Duration;

use log::warn;

use crate::engine::ControllerOptions;

pub const ENV_DATA_DIR: &str = "TRUNK_DATA_DIR";
pub const ENV_RECORD_ADDR: &str = "TRUNK_RECORD_ADDR";
pub const ENV_CONTENT_ENDPOINT: &str = "TRUNK_CONTENT_ENDPOINT";
pub const ENV_REMOTE_TIMEOUT_SECS: &str = "TRUNK_REMOTE_TIMEOUT_SECS";
pub const ENV_FORWARD_MEDIA: &str = "TRUNK_FORWARD_MEDIA";
pub const ENV_OWNER_EMAIL: &str = "TRUNK_OWNER_EMAIL";

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;

/// Where a store keeps its local state and which remotes it talks to.
///
/// Built from `TRUNK_*` environment variables by [`StoreConfig::from_env`], or
/// by hand with the `with_*` setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    /// Address of a record daemon. Without one, records live in an embedded
    /// document store under `data_dir/records`.
    pub record_addr: Option<String>,
    pub content_endpoint: Option<String>,
    pub remote_timeout: Duration,
    pub forward_media: bool,
    /// Overrides the owner email found in settings for role resolution.
    pub owner_email: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            record_addr: None,
            content_endpoint: None,
            remote_timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
            forward_media: false,
            owner_email: None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_flag(name: &str, value: &str) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" | "" => false,
        other => {
            warn!("Ignoring {}={:?}: expected true or false", name, other);
            false
        }
    }
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`StoreConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = non_empty(lookup(ENV_DATA_DIR)) {
            config.data_dir = PathBuf::from(dir);
        }
        config.record_addr = non_empty(lookup(ENV_RECORD_ADDR));
        config.content_endpoint = non_empty(lookup(ENV_CONTENT_ENDPOINT));
        config.owner_email = non_empty(lookup(ENV_OWNER_EMAIL));

        if let Some(raw) = non_empty(lookup(ENV_REMOTE_TIMEOUT_SECS)) {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => config.remote_timeout = Duration::from_secs(secs),
                _ => warn!(
                    "Ignoring {}={:?}, using {}s",
                    ENV_REMOTE_TIMEOUT_SECS, raw, DEFAULT_REMOTE_TIMEOUT_SECS
                ),
            }
        }
        if let Some(raw) = lookup(ENV_FORWARD_MEDIA) {
            config.forward_media = parse_flag(ENV_FORWARD_MEDIA, &raw);
        }
        config
    }

    pub fn with_record_addr(mut self, addr: impl Into<String>) -> Self {
        self.record_addr = Some(addr.into());
        self
    }

    pub fn with_content_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.content_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    pub fn with_forward_media(mut self, forward: bool) -> Self {
        self.forward_media = forward;
        self
    }

    pub fn with_owner_email(mut self, email: impl Into<String>) -> Self {
        self.owner_email = Some(email.into());
        self
    }

    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }

    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join("records")
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            remote_timeout: self.remote_timeout,
            forward_media: self.forward_media,
            endpoint_override: self.content_endpoint.clone(),
            ..ControllerOptions::default()
        }
    }
}
