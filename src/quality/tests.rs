//! 质量模块测试
//!
//! 包含控制器场景测试和轮询循环测试

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use super::{
    calculate_quality_score, ControllerState, EncodingTier, MetricsAggregator,
    MetricsGranularity, NetworkSample, QualityController, QualityLoop, TierTable,
};
use crate::session::ViewerState;
use crate::test_support::{remote_inbound, transport_bytes, FakeConnection, FakeSender};
use crate::transport::{
    PeerConnection, SessionDescription, StatsEntry, StatsReport, TransportError,
};

/// 测试辅助函数：创建处于指定状态的循环
fn make_loop(
    connection: Arc<dyn PeerConnection>,
    sender: Arc<FakeSender>,
    state: ViewerState,
) -> (QualityLoop, watch::Sender<ViewerState>) {
    let (tx, rx) = watch::channel(state);
    let quality_loop = QualityLoop::new(
        "viewer-1",
        connection,
        sender,
        QualityController::default(),
        MetricsAggregator::new(MetricsGranularity::PerCategory),
        rx,
        Duration::from_secs(1),
    );
    (quality_loop, tx)
}

fn report(entries: Vec<StatsEntry>) -> Result<StatsReport, TransportError> {
    Ok(StatsReport::new(entries))
}

/// 在 getStats 返回前把观众标记为已关闭
struct ClosingConnection {
    inner: Arc<FakeConnection>,
    state: watch::Sender<ViewerState>,
}

#[async_trait]
impl PeerConnection for ClosingConnection {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        self.inner.create_offer().await
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        self.inner.set_local_description(description).await
    }

    async fn get_stats(&self) -> Result<StatsReport, TransportError> {
        self.state.send_replace(ViewerState::Closed);
        self.inner.get_stats().await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

// ============================================================================
// Quality Controller Scenario Tests
// ============================================================================

#[tokio::test]
async fn test_degrade_then_recover_exactly_once() {
    let mut controller = QualityController::default();
    let (sender, track) = FakeSender::video("screen");

    controller.apply(sender.as_ref(), EncodingTier::High).await;
    assert_eq!(sender.applied_bitrate(), Some(3_000_000));

    // packetsLost=12, rtt=0.1 -> LOW, 0.8 × 标称码率
    let tier = controller.evaluate(&NetworkSample::new(12, 0.1), sender.applied_bitrate());
    assert_eq!(tier, Some(EncodingTier::Low));
    controller.apply(sender.as_ref(), EncodingTier::Low).await;
    assert_eq!(sender.applied_bitrate(), Some(2_400_000));
    assert_eq!(track.applied_constraints().last().map(|c| c.width.max), Some(1600));

    // 仍然恶化，不重复下发
    assert_eq!(controller.evaluate(&NetworkSample::new(15, 0.1), sender.applied_bitrate()), None);

    // packetsLost=0, rtt=0.05 -> HIGH
    let tier = controller.evaluate(&NetworkSample::new(0, 0.05), sender.applied_bitrate());
    assert_eq!(tier, Some(EncodingTier::High));
    controller.apply(sender.as_ref(), EncodingTier::High).await;
    assert_eq!(sender.applied_bitrate(), Some(3_000_000));

    for _ in 0..5 {
        assert_eq!(controller.evaluate(&NetworkSample::new(0, 0.05), sender.applied_bitrate()), None);
    }
    assert_eq!(controller.state(), ControllerState::StableHigh);
    assert_eq!(controller.transitions(), 2);
    assert_eq!(sender.set_calls(), 3);
}

#[tokio::test]
async fn test_rtt_alone_triggers_degrade() {
    let mut controller = QualityController::default();
    let tier = controller.evaluate(&NetworkSample::new(0, 0.35), Some(3_000_000));
    assert_eq!(tier, Some(EncodingTier::Low));
}

#[tokio::test]
async fn test_constraint_failure_is_not_fatal() {
    let mut controller = QualityController::default();
    let (sender, track) = FakeSender::video("screen");
    track.reject_constraints(true);

    let outcome = controller.apply(sender.as_ref(), EncodingTier::Low).await;

    assert!(outcome.parameters_applied);
    assert!(!outcome.constraints_applied);
    assert_eq!(sender.applied_bitrate(), Some(2_400_000));
    assert!(track.applied_constraints().is_empty());
    assert_eq!(controller.constrained_tier(), EncodingTier::High);
}

#[test]
fn test_tier_table_custom_factor() {
    let tiers = TierTable::new(5_000_000, 0.5, (2560, 1440), (1280, 720), 30, None);
    assert_eq!(tiers.low.bitrate, 2_500_000);
    assert_eq!(tiers.profile(EncodingTier::High).resolution, (2560, 1440));
    assert_eq!(tiers.profile(EncodingTier::Low).max_framerate, 30);
}

#[test]
fn test_quality_score() {
    assert_eq!(calculate_quality_score(20.0, 0, 1.0), 100);
    assert!(calculate_quality_score(400.0, 12, 40.0) < 20);
}

// ============================================================================
// Metrics Tests
// ============================================================================

#[test]
fn test_counters_monotonic_across_polls() {
    let mut aggregator = MetricsAggregator::new(MetricsGranularity::PerCategory);
    let polls = [1_000_000u64, 1_500_000, 1_200_000, 2_000_000, 2_000_000];

    let mut previous = aggregator.snapshot();
    for sent in polls {
        let snapshot = aggregator.ingest(&StatsReport::new(vec![transport_bytes(sent, sent / 2)]));
        assert!(snapshot.dominates(&previous));
        previous = snapshot;
    }

    assert_eq!(previous.transport_bytes_sent, 2_000_000);
    assert_eq!(previous.report_count, 5);
    assert_eq!(aggregator.regressions(), 1);
}

// ============================================================================
// Quality Loop Tests
// ============================================================================

#[tokio::test]
async fn test_tick_degrades_and_publishes() {
    let connection = FakeConnection::new();
    let (sender, _track) = FakeSender::video("screen");
    let (mut quality_loop, _tx) = make_loop(connection.clone(), sender.clone(), ViewerState::Active);
    let metrics = quality_loop.subscribe();

    quality_loop.apply_initial_tier().await;
    connection.push_stats(report(vec![
        remote_inbound(12, 0.1),
        transport_bytes(1_000_000, 20_000),
    ]));

    assert!(quality_loop.tick().await);

    assert_eq!(sender.applied_bitrate(), Some(2_400_000));
    let latest = *metrics.borrow();
    assert_eq!(latest.tier, EncodingTier::Low);
    assert_eq!(latest.snapshot.transport_bytes_sent, 1_000_000);
    assert_eq!(latest.sample.packets_lost, 12);
}

#[tokio::test]
async fn test_stats_failure_skips_tick() {
    let connection = FakeConnection::new();
    let (sender, _track) = FakeSender::video("screen");
    let (mut quality_loop, _tx) = make_loop(connection.clone(), sender.clone(), ViewerState::Active);

    connection.push_stats(Err(TransportError::Timeout));
    assert!(quality_loop.tick().await);

    assert_eq!(sender.set_calls(), 0);
    assert_eq!(quality_loop.controller().state(), ControllerState::StableHigh);
}

#[tokio::test]
async fn test_apply_failure_retried_next_tick() {
    let connection = FakeConnection::new();
    let (sender, _track) = FakeSender::video("screen");
    let (mut quality_loop, _tx) = make_loop(connection.clone(), sender.clone(), ViewerState::Active);
    quality_loop.apply_initial_tier().await;

    sender.reject_parameters(true);
    connection.push_stats(report(vec![remote_inbound(12, 0.1)]));
    quality_loop.tick().await;
    assert_eq!(sender.set_calls(), 2);
    assert_eq!(sender.applied_bitrate(), Some(3_000_000));

    // RTT 仍超标，参数与目标不一致 -> 重试
    sender.reject_parameters(false);
    connection.push_stats(report(vec![remote_inbound(12, 0.4)]));
    quality_loop.tick().await;
    assert_eq!(sender.set_calls(), 3);
    assert_eq!(sender.applied_bitrate(), Some(2_400_000));

    connection.push_stats(report(vec![remote_inbound(12, 0.4)]));
    quality_loop.tick().await;
    assert_eq!(sender.set_calls(), 3);
}

#[tokio::test]
async fn test_failed_constraints_retried_next_tick() {
    let connection = FakeConnection::new();
    let (sender, track) = FakeSender::video("screen");
    let (mut quality_loop, _tx) = make_loop(connection.clone(), sender.clone(), ViewerState::Active);
    quality_loop.apply_initial_tier().await;
    assert_eq!(track.applied_constraints().len(), 1);

    // 码率降档成功，分辨率被拒绝
    track.reject_constraints(true);
    connection.push_stats(report(vec![remote_inbound(12, 0.1)]));
    quality_loop.tick().await;
    assert_eq!(sender.applied_bitrate(), Some(2_400_000));
    assert_eq!(track.applied_constraints().len(), 1);

    // 码率已一致，但约束仍是 HIGH -> 重新下发
    track.reject_constraints(false);
    connection.push_stats(report(vec![remote_inbound(30, 0.4)]));
    quality_loop.tick().await;
    assert_eq!(track.applied_constraints().last().map(|c| c.width.max), Some(1600));
    assert_eq!(quality_loop.controller().constrained_tier(), EncodingTier::Low);

    // 全部一致后不再下发
    let set_calls = sender.set_calls();
    connection.push_stats(report(vec![remote_inbound(40, 0.4)]));
    quality_loop.tick().await;
    assert_eq!(sender.set_calls(), set_calls);
    assert_eq!(track.applied_constraints().len(), 2);
}

#[tokio::test]
async fn test_connecting_viewer_not_polled() {
    let connection = FakeConnection::new();
    let (sender, _track) = FakeSender::video("screen");
    let (mut quality_loop, tx) = make_loop(connection.clone(), sender, ViewerState::Connecting);

    assert!(quality_loop.tick().await);
    assert_eq!(connection.stats_calls(), 0);

    tx.send_replace(ViewerState::Closed);
    assert!(!quality_loop.tick().await);
}

#[tokio::test]
async fn test_results_discarded_after_close() {
    let inner = FakeConnection::new();
    inner.push_stats(report(vec![remote_inbound(50, 0.9)]));
    let (tx, rx) = watch::channel(ViewerState::Active);
    let connection = Arc::new(ClosingConnection {
        inner: inner.clone(),
        state: tx,
    });
    let (sender, _track) = FakeSender::video("screen");

    let mut quality_loop = QualityLoop::new(
        "viewer-1",
        connection,
        sender.clone(),
        QualityController::default(),
        MetricsAggregator::default(),
        rx,
        Duration::from_secs(1),
    );
    let metrics = quality_loop.subscribe();

    assert!(!quality_loop.tick().await);

    assert_eq!(inner.stats_calls(), 1);
    assert_eq!(sender.set_calls(), 0);
    assert_eq!(metrics.borrow().snapshot.report_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_spawned_loop_stops_on_close() {
    let connection = FakeConnection::new();
    let (sender, _track) = FakeSender::video("screen");
    let (quality_loop, tx) = make_loop(connection.clone(), sender, ViewerState::Active);
    let handle = quality_loop.spawn();

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(connection.stats_calls(), 2);

    tx.send_replace(ViewerState::Closed);
    handle.await.unwrap();

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(connection.stats_calls(), 2);
}
