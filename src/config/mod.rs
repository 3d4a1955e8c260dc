use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::live::DEFAULT_LIVE_API;
use crate::storage::DEFAULT_TRAVERSE_DEPTH;
use crate::storage::remote::DEFAULT_PAGE_SIZE;
use crate::upload::DEFAULT_MAX_CONCURRENT;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub local_storage: LocalStorageConfig,
    pub services: ServicesConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    #[serde(default = "default_server_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalStorageConfig {
    pub root_path: PathBuf,
    pub clean_interval_secs: u64,
    /// Bytes kept free on the recorder disk.
    pub reserved_capacity: u64,
    #[serde(default = "default_traverse_depth")]
    pub traverse_depth: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServicesConfig {
    pub default: ServiceEntryConfig,
    #[serde(default)]
    pub streamers: Vec<StreamerConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamerConfig {
    pub room_id: u64,
    #[serde(flatten)]
    pub entry: ServiceEntryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceEntryConfig {
    pub notification: NotificationConfig,
    pub upload: UploadConfig,
    #[serde(default)]
    pub live: LiveConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
    pub webhook_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    pub drive: DriveConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriveConfig {
    pub api_base: String,
    pub access_token: String,
    pub parent_folder_id: String,
    pub timeout_secs: u64,
    /// Bytes kept free on the drive besides the uploaded file.
    pub reserved_capacity: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LiveConfig {
    #[serde(default = "default_live_api")]
    pub api_base: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            api_base: default_live_api(),
        }
    }
}

fn default_server_timeout() -> u64 {
    10
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

fn default_traverse_depth() -> usize {
    DEFAULT_TRAVERSE_DEPTH
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_live_api() -> String {
    DEFAULT_LIVE_API.to_string()
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("unable to read config {}", path))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate().context("config validation failed")?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.timeout_secs == 0 {
            bail!("server.timeout_secs must be > 0");
        }
        if !self.server.webhook_path.starts_with('/') {
            bail!("server.webhook_path must start with '/'");
        }
        if self.server.webhook_path == "/health" {
            bail!("server.webhook_path must not shadow /health");
        }

        if self.local_storage.root_path.as_os_str().is_empty() {
            bail!("local_storage.root_path must not be empty");
        }
        if self.local_storage.clean_interval_secs == 0 {
            bail!("local_storage.clean_interval_secs must be > 0");
        }
        if self.local_storage.traverse_depth == 0 {
            bail!("local_storage.traverse_depth must be > 0");
        }

        self.services.default.validate("services.default")?;
        let mut seen = std::collections::HashSet::new();
        for streamer in &self.services.streamers {
            let name = format!("services.streamers[{}]", streamer.room_id);
            if !seen.insert(streamer.room_id) {
                bail!("{} is configured twice", name);
            }
            streamer.entry.validate(&name)?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }

    pub fn clean_interval(&self) -> Duration {
        Duration::from_secs(self.local_storage.clean_interval_secs)
    }

    /// Service entry for `room_id`, falling back to the default one.
    pub fn service_for(&self, room_id: u64) -> &ServiceEntryConfig {
        self.services
            .streamers
            .iter()
            .find(|s| s.room_id == room_id)
            .map(|s| &s.entry)
            .unwrap_or(&self.services.default)
    }
}

impl ServiceEntryConfig {
    fn validate(&self, name: &str) -> anyhow::Result<()> {
        validate_url(&self.notification.webhook_url)
            .with_context(|| format!("{}.notification.webhook_url", name))?;
        validate_url(&self.live.api_base).with_context(|| format!("{}.live.api_base", name))?;

        let drive = &self.upload.drive;
        validate_url(&drive.api_base).with_context(|| format!("{}.upload.drive.api_base", name))?;
        if drive.parent_folder_id.trim().is_empty() {
            bail!("{}.upload.drive.parent_folder_id must not be empty", name);
        }
        if drive.timeout_secs == 0 {
            bail!("{}.upload.drive.timeout_secs must be > 0", name);
        }
        if drive.page_size == 0 {
            bail!("{}.upload.drive.page_size must be > 0", name);
        }
        if drive.max_concurrent == 0 {
            bail!("{}.upload.drive.max_concurrent must be > 0", name);
        }
        Ok(())
    }
}

impl DriveConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn validate_url(raw: &str) -> anyhow::Result<()> {
    let parsed = Url::parse(raw).with_context(|| format!("invalid url {:?}", raw))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        bail!("invalid url {:?}", raw);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        [server]
        listen = "127.0.0.1:8080"

        [local_storage]
        root_path = "/rec"
        clean_interval_secs = 600
        reserved_capacity = 10737418240

        [services.default.notification]
        webhook_url = "https://discord.com/api/webhooks/1/abc"

        [services.default.upload.drive]
        api_base = "https://drive.example.com/api"
        access_token = "token"
        parent_folder_id = "root-folder"
        timeout_secs = 3600
        reserved_capacity = 1073741824

        [[services.streamers]]
        room_id = 1234

        [services.streamers.notification]
        webhook_url = "https://discord.com/api/webhooks/2/def"

        [services.streamers.upload.drive]
        api_base = "https://drive.example.com/api"
        access_token = "token"
        parent_folder_id = "someone-folder"
        timeout_secs = 3600
        reserved_capacity = 0
        max_concurrent = 2
    "#;

    #[test]
    fn test_parses_with_defaults() {
        let config = Config::parse(CONFIG).expect("valid");

        assert_eq!(config.server.webhook_path, "/webhook");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.local_storage.traverse_depth, DEFAULT_TRAVERSE_DEPTH);
        assert_eq!(config.services.default.upload.drive.page_size, 10);
        assert_eq!(config.services.default.live.api_base, DEFAULT_LIVE_API);
        assert_eq!(config.services.streamers[0].entry.upload.drive.max_concurrent, 2);
    }

    #[test]
    fn test_service_for_falls_back_to_default() {
        let config = Config::parse(CONFIG).expect("valid");

        assert_eq!(
            config.service_for(1234).upload.drive.parent_folder_id,
            "someone-folder"
        );
        assert_eq!(
            config.service_for(99).upload.drive.parent_folder_id,
            "root-folder"
        );
    }

    #[test]
    fn test_rejects_zero_interval() {
        let broken = CONFIG.replace("clean_interval_secs = 600", "clean_interval_secs = 0");
        let err = Config::parse(&broken).expect_err("invalid");
        assert!(format!("{:#}", err).contains("clean_interval_secs"));
    }

    #[test]
    fn test_rejects_bad_webhook_url() {
        let broken = CONFIG.replace("https://discord.com/api/webhooks/1/abc", "discord");
        let err = Config::parse(&broken).expect_err("invalid");
        assert!(format!("{:#}", err).contains("webhook_url"));
    }

    #[test]
    fn test_url_must_parse() {
        assert!(validate_url("https://discord.com/api/webhooks/1/abc?thread_id=9").is_ok());
        assert!(validate_url("http://127.0.0.1:9000").is_ok());
        assert!(validate_url("https://x y").is_err());
        assert!(validate_url("ftp://host/file").is_err());
        assert!(validate_url("https://").is_err());
    }

    #[test]
    fn test_rejects_duplicate_rooms() {
        let twice = format!(
            "{}\n{}",
            CONFIG,
            CONFIG
                .split("[[services.streamers]]")
                .nth(1)
                .map(|s| format!("[[services.streamers]]{}", s))
                .unwrap_or_default()
        );
        let err = Config::parse(&twice).expect_err("duplicate");
        assert!(format!("{:#}", err).contains("configured twice"));
    }
}
