//! 自适应档位控制模块
//!
//! 两状态机：STABLE_HIGH / DEGRADED_LOW
//! 丢包或 RTT 越过阈值时降到 LOW 档，两者都恢复后回到 HIGH 档
//! 参数只在发送端当前码率或轨道约束与目标档位不一致时下发

use crate::transport::{
    ConstrainRange, DegradationPreference, EncodingParameters, NetworkPriority, RtpSender,
    SenderParameters, TrackConstraints,
};

use super::{EncodingTier, NetworkSample, QualityThresholds, TierTable};

/// 控制器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    /// 网络稳定，HIGH 档
    #[default]
    StableHigh,
    /// 网络恶化，LOW 档
    DegradedLow,
}

impl ControllerState {
    pub fn tier(&self) -> EncodingTier {
        match self {
            ControllerState::StableHigh => EncodingTier::High,
            ControllerState::DegradedLow => EncodingTier::Low,
        }
    }

    /// 获取状态描述
    pub fn description(&self) -> &'static str {
        match self {
            ControllerState::StableHigh => "网络稳定",
            ControllerState::DegradedLow => "网络恶化",
        }
    }
}

/// 一次参数下发的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub parameters_applied: bool,
    pub constraints_applied: bool,
}

/// 质量控制器
///
/// 每个视频发送端一个实例，不在观众之间共享
pub struct QualityController {
    tiers: TierTable,
    thresholds: QualityThresholds,
    state: ControllerState,
    /// 最近一次成功应用到轨道的约束档位
    constrained_tier: EncodingTier,
    /// 状态切换次数
    transitions: u32,
}

impl QualityController {
    pub fn new(tiers: TierTable, thresholds: QualityThresholds) -> Self {
        Self {
            tiers,
            thresholds,
            state: ControllerState::StableHigh,
            // 采集按 HIGH 档约束启动
            constrained_tier: EncodingTier::High,
            transitions: 0,
        }
    }

    /// 评估一次采样
    ///
    /// `applied_bitrate` 是发送端当前生效的码率；
    /// 返回需要下发的档位，None 表示码率与轨道约束都已与目标一致
    pub fn evaluate(
        &mut self,
        sample: &NetworkSample,
        applied_bitrate: Option<u32>,
    ) -> Option<EncodingTier> {
        let next = if self.thresholds.is_degraded(sample) {
            ControllerState::DegradedLow
        } else {
            ControllerState::StableHigh
        };

        if next != self.state {
            log::info!(
                "Quality {} -> {} (packetsLost: {}, rtt: {:.3}s)",
                self.state.description(),
                next.description(),
                sample.packets_lost,
                sample.round_trip_time_secs
            );
            self.state = next;
            self.transitions += 1;
        }

        let desired = next.tier();
        let bitrate_matches = applied_bitrate == Some(self.tiers.profile(desired).bitrate);
        if bitrate_matches && self.constrained_tier == desired {
            None
        } else {
            Some(desired)
        }
    }

    /// 在发送端现有参数上写入档位参数
    pub fn sender_parameters(&self, current: SenderParameters, tier: EncodingTier) -> SenderParameters {
        let profile = self.tiers.profile(tier);
        let mut parameters = current;
        if parameters.encodings.is_empty() {
            parameters.encodings.push(EncodingParameters::default());
        }
        if let Some(encoding) = parameters.encodings.first_mut() {
            encoding.max_bitrate = Some(profile.bitrate);
            encoding.max_framerate = Some(profile.max_framerate);
            encoding.network_priority = Some(NetworkPriority::High);
        }
        parameters.degradation_preference = Some(DegradationPreference::MaintainFramerate);
        parameters
    }

    /// 档位对应的轨道约束
    pub fn track_constraints(&self, tier: EncodingTier) -> TrackConstraints {
        let profile = self.tiers.profile(tier);
        TrackConstraints {
            width: ConstrainRange::exact(profile.resolution.0),
            height: ConstrainRange::exact(profile.resolution.1),
            frame_rate: ConstrainRange::exact(profile.max_framerate),
        }
    }

    /// 下发档位到发送端与其轨道
    ///
    /// 失败只记录日志，下一次轮询发现参数或约束不一致会自然重试
    pub async fn apply(&mut self, sender: &dyn RtpSender, tier: EncodingTier) -> ApplyOutcome {
        let parameters = self.sender_parameters(sender.get_parameters(), tier);
        let bitrate = self.tiers.profile(tier).bitrate;

        let parameters_applied = match sender.set_parameters(parameters).await {
            Ok(()) => {
                log::info!("Bitrate adjusted to {} ({} tier)", bitrate, tier.as_str());
                true
            }
            Err(e) => {
                log::error!("Error adjusting bitrate to {}: {}", bitrate, e);
                false
            }
        };

        let constraints_applied = match sender.track() {
            Some(track) => match track.apply_constraints(self.track_constraints(tier)).await {
                Ok(()) => {
                    self.constrained_tier = tier;
                    true
                }
                Err(e) => {
                    log::error!("Error adjusting resolution on track {}: {}", track.id(), e);
                    false
                }
            },
            None => {
                // 没有轨道可约束
                self.constrained_tier = tier;
                false
            }
        };

        ApplyOutcome {
            parameters_applied,
            constraints_applied,
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn current_tier(&self) -> EncodingTier {
        self.state.tier()
    }

    /// 轨道当前生效的约束档位
    pub fn constrained_tier(&self) -> EncodingTier {
        self.constrained_tier
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    pub fn transitions(&self) -> u32 {
        self.transitions
    }
}

impl Default for QualityController {
    fn default() -> Self {
        Self::new(TierTable::default(), QualityThresholds::default())
    }
}
