use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::codec::CodecPreference;
use crate::quality::{MetricsGranularity, QualityThresholds, TierTable};

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// 信令服务地址
    pub signaling_url: String,
    /// 创建对等连接时使用的 STUN 服务器
    pub stun_servers: Vec<String>,
    /// 质量轮询周期 (毫秒)
    pub poll_interval_ms: u64,
    /// 输入中继最小发送间隔 (毫秒)
    pub relay_interval_ms: u64,
    /// HIGH 档码率 (bps)
    pub nominal_bitrate: u32,
    /// LOW 档码率系数
    pub degrade_factor: f64,
    pub high_resolution: (u32, u32),
    pub low_resolution: (u32, u32),
    pub max_framerate: u32,
    /// Override audio sample rate; None keeps the capture default
    pub audio_sample_rate: Option<u32>,
    pub thresholds: QualityThresholds,
    pub codec_preference: CodecPreference,
    pub metrics_granularity: MetricsGranularity,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:8080".to_string(),
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
                "stun:stun2.l.google.com:19302".to_string(),
                "stun:stun3.l.google.com:19302".to_string(),
            ],
            poll_interval_ms: 1000,
            relay_interval_ms: 5,
            nominal_bitrate: 3_000_000,
            degrade_factor: 0.8,
            high_resolution: (1920, 1080),
            low_resolution: (1600, 900),
            max_framerate: 60,
            audio_sample_rate: Some(16_000),
            thresholds: QualityThresholds::default(),
            codec_preference: CodecPreference::default(),
            metrics_granularity: MetricsGranularity::default(),
        }
    }
}

impl HostConfig {
    pub fn tier_table(&self) -> TierTable {
        TierTable::new(
            self.nominal_bitrate,
            self.degrade_factor,
            self.high_resolution,
            self.low_resolution,
            self.max_framerate,
            self.audio_sample_rate,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn relay_interval(&self) -> Duration {
        Duration::from_millis(self.relay_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be > 0".into()));
        }
        if self.relay_interval_ms == 0 {
            return Err(ConfigError::Invalid("relay_interval_ms must be > 0".into()));
        }
        if !(self.degrade_factor > 0.0 && self.degrade_factor <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "degrade_factor {} not in (0, 1]",
                self.degrade_factor
            )));
        }
        for (name, (w, h)) in [
            ("high_resolution", self.high_resolution),
            ("low_resolution", self.low_resolution),
        ] {
            if w == 0 || h == 0 {
                return Err(ConfigError::Invalid(format!("{} is empty: {}x{}", name, w, h)));
            }
        }
        if self.codec_preference.is_empty() {
            return Err(ConfigError::Invalid("codec_preference is empty".into()));
        }
        Ok(())
    }

    /// 从指定路径读取并校验
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: HostConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    /// 读取默认位置的配置，不存在时写入默认值
    pub fn load_or_init() -> Result<Self, ConfigError> {
        let path = config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = HostConfig::default();
            config.save_to(&path)?;
            log::info!("Wrote default config to {}", path.display());
            Ok(config)
        }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gamecast")
        .join("host.json")
}
