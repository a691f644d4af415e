//! Gamecast - Transport Layer
//!
//! 主机与外部协作者之间的接口：
//! - PeerConnection: 对等连接 (统计、本地描述)
//! - RtpSender / MediaTrack: 编码参数与采集约束
//! - SignalingSink: 信令侧信道 (WebSocket)
//!
//! 连接建立与 ICE 由外部对等连接层负责，本模块只定义它们的形状

use async_trait::async_trait;
use std::sync::Arc;

pub mod protocol;
pub mod websocket;

pub use protocol::*;
pub use websocket::WebSocketSignaling;

/// 对等连接 trait
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// 生成 offer
    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    /// 设置本地描述
    ///
    /// 设置完成后由外部信令层发送给对端
    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError>;

    /// 拉取一次传输统计
    async fn get_stats(&self) -> Result<StatsReport, TransportError>;

    /// 关闭连接
    async fn close(&self);
}

/// RTP 发送端 trait
#[async_trait]
pub trait RtpSender: Send + Sync {
    /// 发送的媒体轨道
    fn track(&self) -> Option<Arc<dyn MediaTrack>>;

    /// 当前参数
    fn get_parameters(&self) -> SenderParameters;

    /// 异步设置参数，编码器可能拒绝
    async fn set_parameters(&self, parameters: SenderParameters) -> Result<(), TransportError>;
}

/// 媒体轨道 trait
#[async_trait]
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> TrackKind;

    /// 异步应用分辨率/帧率约束，失败时轨道保持原约束
    async fn apply_constraints(&self, constraints: TrackConstraints) -> Result<(), TransportError>;

    /// 停止采集
    fn stop(&self);
}

/// 信令侧信道 trait (只发送)
#[async_trait]
pub trait SignalingSink: Send + Sync {
    async fn send(&self, message: &SignalMessage) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;
}

/// 一次媒体呼叫：连接 + 各路发送端
#[derive(Clone)]
pub struct MediaCall {
    pub connection: Arc<dyn PeerConnection>,
    pub senders: Vec<Arc<dyn RtpSender>>,
}

impl MediaCall {
    pub fn new(connection: Arc<dyn PeerConnection>, senders: Vec<Arc<dyn RtpSender>>) -> Self {
        Self {
            connection,
            senders,
        }
    }

    /// 发送视频轨道的发送端
    pub fn video_senders(&self) -> impl Iterator<Item = &Arc<dyn RtpSender>> {
        self.senders.iter().filter(|sender| {
            sender
                .track()
                .map(|track| track.kind() == TrackKind::Video)
                .unwrap_or(false)
        })
    }
}

impl std::fmt::Debug for MediaCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaCall")
            .field("senders", &self.senders.len())
            .finish()
    }
}
