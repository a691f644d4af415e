//! 单个观众连接
//!
//! 生命周期通过 watch 通道广播给该观众的所有质量循环；
//! 关闭时取消循环、停止轨道、关闭连接，Drop 时同样执行

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::codec::CodecEnforcingConnection;
use crate::config::HostConfig;
use crate::quality::{MetricsAggregator, QualityController, QualityLoop, ViewerMetrics};
use crate::transport::{CloseReason, MediaCall, PeerConnection, RtpSender, TransportError};

use super::{SessionError, ViewerState};

/// 已挂接的媒体呼叫
struct AttachedCall {
    connection: Arc<dyn PeerConnection>,
    senders: Vec<Arc<dyn RtpSender>>,
}

pub struct ViewerSession {
    id: String,
    state: watch::Sender<ViewerState>,
    channel_open: bool,
    call: Option<AttachedCall>,
    /// 每个视频发送端一个循环任务
    loops: Vec<JoinHandle<()>>,
    metrics: Vec<watch::Receiver<ViewerMetrics>>,
    created_at: Instant,
}

impl ViewerSession {
    pub fn new(id: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ViewerState::Connecting);
        Self {
            id: id.into(),
            state,
            channel_open: false,
            call: None,
            loops: Vec::new(),
            metrics: Vec::new(),
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> ViewerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ViewerState> {
        self.state.subscribe()
    }

    /// 数据/控制通道已打开；返回是否因此进入 ACTIVE
    pub fn channel_opened(&mut self) -> bool {
        self.channel_open = true;
        self.try_activate()
    }

    /// 挂接媒体呼叫
    ///
    /// 包装连接以强制编解码器偏好，完成本地描述后为每个视频发送端
    /// 下发 HIGH 档并启动质量循环；返回是否因此进入 ACTIVE。
    /// 已有呼叫时先释放旧呼叫
    pub async fn attach_call(
        &mut self,
        call: MediaCall,
        config: &HostConfig,
    ) -> Result<bool, SessionError> {
        if self.state() == ViewerState::Closed {
            return Err(SessionError::Negotiation(TransportError::Closed));
        }
        config.validate()?;

        if let Some(previous) = self.detach_call() {
            log::info!("Viewer {} replacing previous call", self.id);
            previous.close().await;
        }

        let connection: Arc<dyn PeerConnection> = Arc::new(CodecEnforcingConnection::new(
            call.connection.clone(),
            config.codec_preference.clone(),
        ));
        let video_senders: Vec<Arc<dyn RtpSender>> = call.video_senders().cloned().collect();

        // 先登记，协商失败时 close() 也能释放轨道
        self.call = Some(AttachedCall {
            connection: connection.clone(),
            senders: call.senders,
        });

        let offer = connection.create_offer().await?;
        connection.set_local_description(offer).await?;

        if self.state() == ViewerState::Closed {
            return Err(SessionError::Negotiation(TransportError::Closed));
        }

        for sender in video_senders {
            let mut quality_loop = QualityLoop::new(
                self.id.clone(),
                connection.clone(),
                sender,
                QualityController::new(config.tier_table(), config.thresholds),
                MetricsAggregator::new(config.metrics_granularity),
                self.state.subscribe(),
                config.poll_interval(),
            );
            quality_loop.apply_initial_tier().await;
            self.metrics.push(quality_loop.subscribe());
            self.loops.push(quality_loop.spawn());
        }

        log::info!(
            "Viewer {} attached call with {} video sender(s)",
            self.id,
            self.loops.len()
        );
        Ok(self.try_activate())
    }

    fn try_activate(&mut self) -> bool {
        if self.state() == ViewerState::Connecting && self.channel_open && !self.loops.is_empty() {
            self.state.send_replace(ViewerState::Active);
            log::info!("Viewer {} is active", self.id);
            true
        } else {
            false
        }
    }

    /// 各视频发送端的最新指标
    pub fn metrics(&self) -> Vec<ViewerMetrics> {
        self.metrics.iter().map(|rx| *rx.borrow()).collect()
    }

    pub fn connected_secs(&self) -> u64 {
        self.created_at.elapsed().as_secs()
    }

    /// 取消循环并停止当前呼叫的轨道，返回需要关闭的连接
    fn detach_call(&mut self) -> Option<Arc<dyn PeerConnection>> {
        for handle in self.loops.drain(..) {
            handle.abort();
        }
        self.metrics.clear();

        let call = self.call.take()?;
        for sender in &call.senders {
            if let Some(track) = sender.track() {
                track.stop();
            }
        }
        Some(call.connection)
    }

    /// 同步部分的清理，返回需要关闭的连接；已关闭时返回 None
    fn release(&mut self) -> Option<Arc<dyn PeerConnection>> {
        if self.state() == ViewerState::Closed {
            return None;
        }
        self.state.send_replace(ViewerState::Closed);
        self.detach_call()
    }

    /// 关闭观众连接；返回 false 表示之前已关闭
    pub async fn close(&mut self, reason: &CloseReason) -> bool {
        let was_open = self.state() != ViewerState::Closed;
        if let Some(connection) = self.release() {
            connection.close().await;
        }
        if was_open {
            log::info!("Viewer {} closed: {}", self.id, reason);
        }
        was_open
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        if let Some(connection) = self.release() {
            log::debug!("Viewer {} dropped without close, releasing", self.id);
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move { connection.close().await });
            }
        }
    }
}
