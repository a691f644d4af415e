//! 网络质量监测模块
//!
//! 从统计报告中提取丢包与 RTT 采样，并保留最近的 RTT 历史用于平滑显示

use std::collections::{HashMap, VecDeque};

use crate::transport::StatsReport;

use super::NetworkSample;

/// RTT 历史长度
const RTT_HISTORY: usize = 100;

/// 网络质量监测器
///
/// 远端报告的 packetsLost 是累计值，这里按对象记录上一次的值，
/// 采样中的丢包数是两次轮询之间的增量
pub struct NetworkMonitor {
    /// remote-inbound-rtp ID -> 上次累计丢包
    last_lost: HashMap<String, i64>,
    /// RTT 样本 (毫秒)
    rtt_samples: VecDeque<f32>,
}

impl NetworkMonitor {
    pub fn new() -> Self {
        Self {
            last_lost: HashMap::new(),
            rtt_samples: VecDeque::with_capacity(RTT_HISTORY),
        }
    }

    /// 从一次报告中提取视频方向的采样
    pub fn observe(&mut self, report: &StatsReport) -> NetworkSample {
        let mut sample = NetworkSample::default();

        for entry in report
            .of_type("remote-inbound-rtp")
            .filter(|entry| entry.is_video())
        {
            let lost = entry.packets_lost.unwrap_or(0).max(0);
            let previous = self.last_lost.get(&entry.id).copied().unwrap_or(0);
            if lost > previous {
                sample.packets_lost += (lost - previous) as u64;
            }
            // 计数器重置后以新值为基线
            self.last_lost.insert(entry.id.clone(), lost);

            if let Some(rtt) = entry.round_trip_time {
                sample.round_trip_time_secs = sample.round_trip_time_secs.max(rtt);
            }
            if let Some(jitter) = entry.jitter {
                sample.jitter_secs = sample.jitter_secs.max(jitter);
            }
        }

        self.record_rtt_ms((sample.round_trip_time_secs * 1000.0) as f32);
        sample
    }

    fn record_rtt_ms(&mut self, rtt_ms: f32) {
        self.rtt_samples.push_back(rtt_ms);
        if self.rtt_samples.len() > RTT_HISTORY {
            self.rtt_samples.pop_front();
        }
    }

    /// 平均 RTT (毫秒)
    pub fn average_rtt_ms(&self) -> f32 {
        if self.rtt_samples.is_empty() {
            return 0.0;
        }
        self.rtt_samples.iter().sum::<f32>() / self.rtt_samples.len() as f32
    }

    /// P95 RTT (毫秒)
    pub fn p95_rtt_ms(&self) -> f32 {
        let mut samples: Vec<f32> = self.rtt_samples.iter().copied().collect();
        samples.sort_by(|a, b| a.total_cmp(b));
        percentile(&samples, 0.95)
    }

    pub fn rtt_sample_count(&self) -> usize {
        self.rtt_samples.len()
    }

    pub fn reset(&mut self) {
        self.last_lost.clear();
        self.rtt_samples.clear();
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// 计算百分位值
fn percentile(sorted_data: &[f32], p: f32) -> f32 {
    if sorted_data.is_empty() {
        return 0.0;
    }
    let index = (sorted_data.len() as f32 * p) as usize;
    sorted_data
        .get(index.min(sorted_data.len() - 1))
        .copied()
        .unwrap_or(0.0)
}

/// 观众端播放统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackStats {
    pub frames_per_second: f64,
    pub packets_lost: i64,
    /// 候选对的当前 RTT (毫秒)
    pub rtt_ms: u32,
    /// 秒
    pub jitter: f64,
    pub width: u32,
    pub height: u32,
    pub video_codec: String,
    pub audio_codec: String,
    pub audio_sample_rate: u32,
    /// 所有 inbound-rtp 的接收字节
    pub bytes_received: u64,
}

impl PlaybackStats {
    pub fn from_report(report: &StatsReport) -> Self {
        let mut stats = PlaybackStats::default();

        for entry in report.iter() {
            match entry.report_type.as_str() {
                "inbound-rtp" => {
                    stats.bytes_received += entry.bytes_received.unwrap_or(0);
                    if entry.is_video() {
                        stats.frames_per_second =
                            entry.frames_per_second.unwrap_or(stats.frames_per_second);
                        stats.packets_lost = entry.packets_lost.unwrap_or(stats.packets_lost);
                        stats.jitter = entry.jitter.unwrap_or(stats.jitter);
                        stats.width = entry.frame_width.unwrap_or(stats.width);
                        stats.height = entry.frame_height.unwrap_or(stats.height);
                    }
                }
                "candidate-pair" => {
                    if let Some(rtt) = entry.current_round_trip_time {
                        stats.rtt_ms = (rtt * 1000.0).round() as u32;
                    }
                }
                "codec" => match entry.mime_type.as_deref() {
                    Some(mime) if mime.starts_with("video/") => {
                        stats.video_codec = mime.to_string();
                    }
                    Some(mime) if mime.starts_with("audio/") => {
                        stats.audio_codec = mime.to_string();
                        stats.audio_sample_rate = entry.clock_rate.unwrap_or(0);
                    }
                    _ => {}
                },
                _ => {}
            }
        }

        stats
    }
}

/// 会话时长格式化为 HH:MM:SS
pub fn format_elapsed(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}
