//! 质量控制循环
//!
//! 每个视频发送端一个任务：轮询 -> 聚合 -> 决策 -> 下发，严格按顺序执行，
//! 上一次下发完成前不会开始下一次评估

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::session::ViewerState;
use crate::transport::{PeerConnection, RtpSender};

use super::{
    calculate_quality_score, EncodingTier, MetricsAggregator, MetricsSnapshot, NetworkMonitor,
    NetworkSample, QualityController,
};

/// 发布给展示层的观众指标
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewerMetrics {
    pub snapshot: MetricsSnapshot,
    pub tier: EncodingTier,
    pub sample: NetworkSample,
    /// 0-100
    pub quality_score: u8,
}

/// 单个发送端的控制循环
pub struct QualityLoop {
    viewer_id: String,
    connection: Arc<dyn PeerConnection>,
    sender: Arc<dyn RtpSender>,
    controller: QualityController,
    aggregator: MetricsAggregator,
    monitor: NetworkMonitor,
    lifecycle: watch::Receiver<ViewerState>,
    metrics: watch::Sender<ViewerMetrics>,
    period: Duration,
}

impl QualityLoop {
    pub fn new(
        viewer_id: impl Into<String>,
        connection: Arc<dyn PeerConnection>,
        sender: Arc<dyn RtpSender>,
        controller: QualityController,
        aggregator: MetricsAggregator,
        lifecycle: watch::Receiver<ViewerState>,
        period: Duration,
    ) -> Self {
        let (metrics, _) = watch::channel(ViewerMetrics::default());
        Self {
            viewer_id: viewer_id.into(),
            connection,
            sender,
            controller,
            aggregator,
            monitor: NetworkMonitor::new(),
            lifecycle,
            metrics,
            period,
        }
    }

    /// 订阅最新指标
    pub fn subscribe(&self) -> watch::Receiver<ViewerMetrics> {
        self.metrics.subscribe()
    }

    /// 下发初始 HIGH 档参数
    pub async fn apply_initial_tier(&mut self) {
        self.controller
            .apply(self.sender.as_ref(), EncodingTier::High)
            .await;
    }

    /// 启动循环任务
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即返回，首次轮询在一个周期之后
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.lifecycle.changed() => {
                    if changed.is_err() || *self.lifecycle.borrow() == ViewerState::Closed {
                        break;
                    }
                    continue;
                }
            }

            if !self.tick().await {
                break;
            }
        }

        log::debug!("Quality loop for viewer {} stopped", self.viewer_id);
    }

    fn viewer_state(&self) -> ViewerState {
        *self.lifecycle.borrow()
    }

    /// 执行一次轮询，返回 false 表示循环应结束
    pub async fn tick(&mut self) -> bool {
        match self.viewer_state() {
            ViewerState::Closed => return false,
            ViewerState::Connecting => return true,
            ViewerState::Active => {}
        }

        let report = match self.connection.get_stats().await {
            Ok(report) => report,
            Err(e) => {
                log::warn!("Error getting stats for viewer {}: {}", self.viewer_id, e);
                return true;
            }
        };

        // 等待统计期间观众可能已经离开，结果作废
        if self.viewer_state() != ViewerState::Active {
            log::debug!("Discarding stats for inactive viewer {}", self.viewer_id);
            return self.viewer_state() != ViewerState::Closed;
        }

        let snapshot = self.aggregator.ingest(&report);
        let sample = self.monitor.observe(&report);
        let applied = self.sender.get_parameters().applied_bitrate();

        if let Some(tier) = self.controller.evaluate(&sample, applied) {
            self.controller.apply(self.sender.as_ref(), tier).await;
        }

        let rtt_ms = (sample.round_trip_time_secs * 1000.0) as f32;
        let jitter_ms = (sample.jitter_secs * 1000.0) as f32;
        self.metrics.send_replace(ViewerMetrics {
            snapshot,
            tier: self.controller.current_tier(),
            sample,
            quality_score: calculate_quality_score(rtt_ms, sample.packets_lost, jitter_ms),
        });

        true
    }

    pub fn controller(&self) -> &QualityController {
        &self.controller
    }
}
