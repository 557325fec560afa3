//! Configuration management for Cinder services

use config::ConfigError;
use serde::Deserialize;
use std::env;

/// Message bus configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MessageBusConfig {
    pub url: String,
    pub subject_prefix: String,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStorageConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: Option<String>,
}

/// Where produced files end up and which of them are published
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend name; `local` keeps files on disk and skips uploads
    pub oss_type: String,
    /// Whether the raw `upload.mp4` is published next to the renditions
    pub upload_mp4_file: bool,
    pub object_storage: Option<ObjectStorageConfig>,
}

impl StorageConfig {
    pub fn is_local(&self) -> bool {
        self.oss_type.eq_ignore_ascii_case("local")
    }
}

/// Transcoding behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct TranscodingConfig {
    /// Try the hardware encoder before falling back to software
    pub use_gpu: bool,
    /// Add a 1080p 60fps rendition when the source is fast enough
    pub generate_1080p60: bool,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

impl Default for TranscodingConfig {
    fn default() -> Self {
        Self {
            use_gpu: false,
            generate_1080p60: false,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub message_bus: MessageBusConfig,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub transcoding: TranscodingConfig,
    pub storage: StorageConfig,
    pub health_check_port: u16,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let message_bus = MessageBusConfig {
            url: var("MESSAGE_BUS_URL", "nats://localhost:4222"),
            subject_prefix: var("MESSAGE_BUS_SUBJECT_PREFIX", "cinder"),
        };

        let transcoding = TranscodingConfig {
            use_gpu: parse_bool(&lookup, "TRANSCODING_USE_GPU", false)?,
            generate_1080p60: parse_bool(&lookup, "TRANSCODING_GENERATE_1080P60", false)?,
            ffmpeg_path: var("FFMPEG_PATH", "ffmpeg"),
            ffprobe_path: var("FFPROBE_PATH", "ffprobe"),
        };

        // Build object storage config if all required vars are present
        let object_storage = if let (Some(endpoint), Some(access_key), Some(secret_key), Some(bucket)) = (
            lookup("OBJECT_STORAGE_ENDPOINT"),
            lookup("OBJECT_STORAGE_ACCESS_KEY"),
            lookup("OBJECT_STORAGE_SECRET_KEY"),
            lookup("OBJECT_STORAGE_BUCKET"),
        ) {
            Some(ObjectStorageConfig {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region: lookup("OBJECT_STORAGE_REGION"),
            })
        } else {
            None
        };

        let storage = StorageConfig {
            oss_type: var("STORAGE_OSS_TYPE", "local"),
            upload_mp4_file: parse_bool(&lookup, "STORAGE_UPLOAD_MP4_FILE", false)?,
            object_storage,
        };

        if !storage.is_local() && storage.object_storage.is_none() {
            return Err(ConfigError::Message(format!(
                "STORAGE_OSS_TYPE={} requires OBJECT_STORAGE_ENDPOINT, OBJECT_STORAGE_ACCESS_KEY, \
                 OBJECT_STORAGE_SECRET_KEY and OBJECT_STORAGE_BUCKET",
                storage.oss_type
            )));
        }

        let health_check_port = match lookup("HEALTH_CHECK_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                ConfigError::Message(format!("HEALTH_CHECK_PORT is not a valid port: {}", raw))
            })?,
            None => 8080,
        };

        Ok(Self {
            message_bus,
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            redis_url: lookup("REDIS_URL").filter(|url| !url.is_empty()),
            transcoding,
            storage,
            health_check_port,
            log_level: Some(var("LOG_LEVEL", "info")),
            log_format: lookup("LOG_FORMAT"),
        })
    }

    /// Get message bus URL
    pub fn message_bus_url(&self) -> &str {
        &self.message_bus.url
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(ConfigError::Message(format!("{} is not a boolean: {}", key, raw))),
        },
    }
}
