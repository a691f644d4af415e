//! 自适应质量控制模块 - Quality Agent
//!
//! 职责：
//! 1. 将传输统计折叠为每个观众独立的累计计数器
//! 2. 根据丢包/RTT 在 HIGH 与 LOW 两档编码参数间切换
//! 3. 每个观众的视频发送端运行独立的轮询循环
//!
//! 模块结构：
//! - metrics: 统计报告聚合 (字节/包计数)
//! - monitor: 网络质量采样 (丢包、RTT) 与观众端播放统计
//! - adaptive_controller: 档位状态机与参数下发
//! - control_loop: 每个发送端的定时轮询任务
//! - tests: 单元测试

use serde::{Deserialize, Serialize};

// 子模块声明
pub mod adaptive_controller;
pub mod control_loop;
pub mod metrics;
pub mod monitor;

#[cfg(test)]
mod tests;

// 重新导出常用类型
pub use adaptive_controller::{ControllerState, QualityController};
pub use control_loop::{QualityLoop, ViewerMetrics};
pub use metrics::{as_megabytes, MetricsAggregator, MetricsGranularity, MetricsSnapshot};
pub use monitor::{format_elapsed, NetworkMonitor, PlaybackStats};

/// 编码档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingTier {
    #[default]
    High,
    Low,
}

impl EncodingTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingTier::High => "high",
            EncodingTier::Low => "low",
        }
    }
}

/// 档位对应的编码参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierProfile {
    /// 目标码率 (bps)
    pub bitrate: u32,
    /// 分辨率
    pub resolution: (u32, u32),
    /// 帧率上限
    pub max_framerate: u32,
    /// 音频采样率覆盖
    pub audio_sample_rate: Option<u32>,
}

/// HIGH/LOW 两档参数表
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierTable {
    pub high: TierProfile,
    pub low: TierProfile,
}

impl TierTable {
    /// 根据标称码率构造，LOW 档码率 = 标称码率 × degrade_factor
    pub fn new(
        nominal_bitrate: u32,
        degrade_factor: f64,
        high_resolution: (u32, u32),
        low_resolution: (u32, u32),
        max_framerate: u32,
        audio_sample_rate: Option<u32>,
    ) -> Self {
        let low_bitrate = (nominal_bitrate as f64 * degrade_factor).round() as u32;
        Self {
            high: TierProfile {
                bitrate: nominal_bitrate,
                resolution: high_resolution,
                max_framerate,
                audio_sample_rate,
            },
            low: TierProfile {
                bitrate: low_bitrate,
                resolution: low_resolution,
                max_framerate,
                audio_sample_rate,
            },
        }
    }

    pub fn profile(&self, tier: EncodingTier) -> &TierProfile {
        match tier {
            EncodingTier::High => &self.high,
            EncodingTier::Low => &self.low,
        }
    }
}

impl Default for TierTable {
    fn default() -> Self {
        // 3 Mbps, 1080p/900p @ 60fps
        Self::new(3_000_000, 0.8, (1920, 1080), (1600, 900), 60, Some(16_000))
    }
}

/// 降档阈值
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityThresholds {
    /// 一个采样窗口内的丢包数 (>= 触发)
    pub packet_loss_count: u64,
    /// 往返时延，秒 (> 触发)
    pub round_trip_time_secs: f64,
}

impl QualityThresholds {
    /// 采样是否越过任一阈值
    pub fn is_degraded(&self, sample: &NetworkSample) -> bool {
        sample.packets_lost >= self.packet_loss_count
            || sample.round_trip_time_secs > self.round_trip_time_secs
    }
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            packet_loss_count: 10,
            round_trip_time_secs: 0.3,
        }
    }
}

/// 一次轮询得到的网络质量采样
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetworkSample {
    /// 本窗口内的丢包数
    pub packets_lost: u64,
    /// 往返时延 (秒)
    pub round_trip_time_secs: f64,
    /// 抖动 (秒)
    pub jitter_secs: f64,
}

impl NetworkSample {
    pub fn new(packets_lost: u64, round_trip_time_secs: f64) -> Self {
        Self {
            packets_lost,
            round_trip_time_secs,
            jitter_secs: 0.0,
        }
    }
}

/// 网络质量评分 (0-100)
pub fn calculate_quality_score(rtt_ms: f32, packets_lost: u64, jitter_ms: f32) -> u8 {
    let rtt_score = if rtt_ms < 50.0 {
        40
    } else if rtt_ms < 150.0 {
        30
    } else if rtt_ms < 300.0 {
        20
    } else {
        10
    };

    let loss_score = match packets_lost {
        0 => 30,
        1..=4 => 20,
        5..=9 => 10,
        _ => 0,
    };

    let jitter_score = if jitter_ms < 5.0 {
        30
    } else if jitter_ms < 15.0 {
        20
    } else if jitter_ms < 30.0 {
        10
    } else {
        0
    };

    (rtt_score + loss_score + jitter_score).min(100) as u8
}
