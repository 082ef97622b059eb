use crate::ocr::Credential;
use crate::types::DeviceSource;
use log::{info, warn};
use std::env;
use std::fmt::Display;
use std::fs::read_to_string;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unable to read {key} from {path:?}: {source}")]
    Secret {
        key: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Collection names for the three document streams.
#[derive(Debug, Clone, PartialEq)]
pub struct Collections {
    pub plates: String,
    pub sensors: String,
    pub ingestion: String,
}

impl Collections {
    pub fn names(&self) -> [&str; 3] {
        [&self.plates, &self.sensors, &self.ingestion]
    }
}

impl Default for Collections {
    fn default() -> Self {
        Collections {
            plates: "plates_data".to_string(),
            sensors: "sensors_data".to_string(),
            ingestion: "ingestion_data".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: PathBuf,
    pub database_timeout: Duration,
    pub collections: Collections,
    pub vision_endpoint: String,
    pub vision_credential: Credential,
    pub ocr_timeout: Duration,
    pub strict_validation: bool,
    pub fail_on_ocr_error: bool,
    pub device_source: DeviceSource,
    pub mirror_images: bool,
    pub image_dir: Option<PathBuf>,
    pub jpeg_quality: u8,
    pub max_image_bytes: u64,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `load` uses the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = Source { lookup };
        let collections = Collections {
            plates: source.collection("PLATES_COLLECTION", "plates_data")?,
            sensors: source.collection("SENSORS_COLLECTION", "sensors_data")?,
            ingestion: source.collection("INGESTION_COLLECTION", "ingestion_data")?,
        };

        let jpeg_quality: u8 = source.parse("JPEG_QUALITY", "90")?;
        if !(1..=100).contains(&jpeg_quality) {
            return Err(ConfigError::Invalid {
                key: "JPEG_QUALITY",
                value: jpeg_quality.to_string(),
                reason: "must be between 1 and 100".to_string(),
            });
        }

        Ok(Config {
            port: source.parse("PORT", "8080")?,
            database_path: PathBuf::from(source.string("DATABASE_PATH", "plates.db")),
            database_timeout: Duration::from_secs(source.parse("DATABASE_TIMEOUT_SECS", "5")?),
            collections,
            vision_endpoint: source.string("VISION_ENDPOINT", DEFAULT_VISION_ENDPOINT),
            vision_credential: source.credential()?,
            ocr_timeout: Duration::from_secs(source.parse("OCR_TIMEOUT_SECS", "30")?),
            strict_validation: source.flag("STRICT_VALIDATION", false)?,
            fail_on_ocr_error: source.flag("FAIL_ON_OCR_ERROR", true)?,
            device_source: source.parse("DEVICE_SOURCE", "camera")?,
            mirror_images: source.flag("MIRROR_IMAGES", false)?,
            image_dir: source.optional("IMAGE_DIR").map(PathBuf::from),
            jpeg_quality,
            max_image_bytes: source.parse("MAX_IMAGE_BYTES", "10485760")?,
        })
    }
}

/// Read on its own, before logging is set up. Unrecognized values leave
/// debug logging off.
pub fn debug_enabled() -> bool {
    debug_flag(env::var("DEBUG").ok().as_deref())
}

fn debug_flag(value: Option<&str>) -> bool {
    value.and_then(parse_flag).unwrap_or(false)
}

struct Source<F> {
    lookup: F,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| {
            info!("{} not set, using default: {}", key, default);
            default.to_string()
        })
    }

    fn parse<T>(&self, key: &'static str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let value = self.string(key, default);
        value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        })
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => parse_flag(&value).ok_or(ConfigError::Invalid {
                key,
                value,
                reason: "expected true or false".to_string(),
            }),
        }
    }

    fn collection(&self, key: &'static str, default: &str) -> Result<String, ConfigError> {
        let name = self.string(key, default);
        if is_identifier(&name) {
            Ok(name)
        } else {
            Err(ConfigError::Invalid {
                key,
                value: name,
                reason: "collection names may only contain letters, digits and '_'".to_string(),
            })
        }
    }

    fn credential(&self) -> Result<Credential, ConfigError> {
        if let Some(key) = self.optional("VISION_API_KEY") {
            return Ok(Credential::ApiKey(key));
        }
        if let Some(token) = self.optional("VISION_ACCESS_TOKEN") {
            return Ok(Credential::BearerToken(token));
        }
        if let Some(path) = self.optional("VISION_ACCESS_TOKEN_FILE") {
            let path = PathBuf::from(path);
            return read_to_string(&path)
                .map(|s| Credential::BearerToken(s.trim().to_string()))
                .map_err(|source| ConfigError::Secret {
                    key: "VISION_ACCESS_TOKEN_FILE",
                    path,
                    source,
                });
        }
        warn!("No Vision credential configured; text detection requests will be unauthenticated");
        Ok(Credential::None)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
