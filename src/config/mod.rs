use crate::services::compositor::DEFAULT_MAX_PIXELS;
use crate::utils::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, sync::Arc};

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_CAPTION_CHARS: usize = 100;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub ip_header: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UploadConfig {
    pub max_bytes: usize,
    pub allowed_types: Vec<String>,
    pub max_caption_chars: usize,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RenderConfig {
    pub jpeg_quality: u8,
    /// Extra directory scanned for caption fonts, on top of the system fonts.
    #[serde(default)]
    pub fonts_dir: Option<String>,
    /// Sources declaring more pixels than this fail before decoding.
    #[serde(default = "default_max_pixels")]
    pub max_pixels: u64,
    /// Compositions allowed on the blocking pool at once. Further requests wait.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub directory: String,
    pub file_prefix: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_pixels() -> u64 {
    DEFAULT_MAX_PIXELS
}

fn default_max_concurrent() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            file_prefix: "meme-generator".to_string(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ip_header: "x-forwarded-for".to_string(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_types: ["image/jpeg", "image/png", "image/jpg", "image/webp"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_caption_chars: DEFAULT_MAX_CAPTION_CHARS,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            fonts_dir: None,
            max_pixels: default_max_pixels(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_PORT,
                request_timeout_secs: default_request_timeout(),
                proxy: ProxyConfig::default(),
            },
            upload: UploadConfig::default(),
            render: RenderConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Arc<Self>> {
        let path = path.as_ref();

        if !path.exists() {
            let example_path = path.with_extension("yml.example");

            if example_path.exists() {
                tracing::info!("creating config from {:?}", example_path);
                fs::copy(&example_path, path)
                    .map_err(|e| AppError::Config(format!("failed to copy example config: {}", e)))?;
            } else {
                tracing::info!("config file missing, writing defaults");
                let config_str = serde_yaml::to_string(&Config::default())
                    .map_err(|e| AppError::Config(format!("failed to serialize defaults: {}", e)))?;

                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        fs::create_dir_all(parent).map_err(|e| {
                            AppError::Config(format!("failed to create config directory: {}", e))
                        })?;
                    }
                }

                fs::write(path, config_str)
                    .map_err(|e| AppError::Config(format!("failed to write default config: {}", e)))?;

                tracing::info!("default config written to {:?}", path);
            }
        }

        let config_str = fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("failed to read config file: {}", e)))?;

        let mut config = Self::from_yaml(&config_str)?;
        config.apply_env_overrides(std::env::var("PORT").ok().as_deref())?;
        config.validate()?;

        Ok(Arc::new(config))
    }

    pub fn from_yaml(source: &str) -> Result<Self> {
        serde_yaml::from_str(source)
            .map_err(|e| AppError::Config(format!("failed to parse config file: {}", e)))
    }

    /// `PORT` wins over the file so container platforms can assign it.
    pub fn apply_env_overrides(&mut self, port: Option<&str>) -> Result<()> {
        if let Some(port) = port {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("invalid PORT {:?}: {}", port, e)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AppError::Config("server port must be greater than 0".to_string()));
        }

        if self.server.host.is_empty() {
            return Err(AppError::Config("server host cannot be empty".to_string()));
        }

        if self.server.request_timeout_secs == 0 {
            return Err(AppError::Config("request timeout must be greater than 0".to_string()));
        }

        if self.upload.max_bytes == 0 {
            return Err(AppError::Config("upload max_bytes must be greater than 0".to_string()));
        }

        if self.upload.allowed_types.is_empty() {
            return Err(AppError::Config("upload allowed_types cannot be empty".to_string()));
        }

        if self.upload.max_caption_chars == 0 {
            return Err(AppError::Config(
                "upload max_caption_chars must be greater than 0".to_string(),
            ));
        }

        if !(1..=100).contains(&self.render.jpeg_quality) {
            return Err(AppError::Config("jpeg_quality must be within 1..=100".to_string()));
        }

        if self.render.max_pixels == 0 {
            return Err(AppError::Config("render max_pixels must be greater than 0".to_string()));
        }

        if self.render.max_concurrent == 0 {
            return Err(AppError::Config(
                "render max_concurrent must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
