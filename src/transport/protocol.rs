//! Gamecast Transport Protocol Definitions
//!
//! 定义信令侧信道消息、会话描述、发送端参数、轨道约束和统计报告的数据格式
//! 统计报告沿用 W3C RTCStats 的 camelCase JSON 字段

use serde::{Deserialize, Serialize};
use std::io;

/// 传输错误类型
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    Io(String),
    Codec(String),
    Connection(String),
    /// 对端或编码器拒绝了请求的参数/约束
    Rejected(String),
    Timeout,
    NotConnected,
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "IO error: {}", e),
            TransportError::Codec(e) => write!(f, "Codec error: {}", e),
            TransportError::Connection(e) => write!(f, "Connection error: {}", e),
            TransportError::Rejected(e) => write!(f, "Request rejected: {}", e),
            TransportError::Timeout => write!(f, "Operation timeout"),
            TransportError::NotConnected => write!(f, "Not connected"),
            TransportError::Closed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        TransportError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        TransportError::Codec(e.to_string())
    }
}

/// 信令侧信道消息 (JSON 文本帧)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// 观众的媒体/数据连接已关闭
    PeerDisconnected { peer: String },
    /// 手柄输入中继
    Joystick {
        #[serde(rename = "peerId")]
        peer_id: String,
        id: String,
        axes: Vec<f64>,
        buttons: Vec<f64>,
    },
}

impl SignalMessage {
    pub fn encode(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(Into::into)
    }

    pub fn decode(text: &str) -> Result<Self, TransportError> {
        serde_json::from_str(text).map_err(Into::into)
    }
}

/// 会话描述类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// 会话描述 (offer/answer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// 带宽不足时编码器的降级偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DegradationPreference {
    MaintainFramerate,
    MaintainResolution,
    Balanced,
}

/// 网络优先级 (QoS 提示，不保证生效)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkPriority {
    VeryLow,
    Low,
    Medium,
    High,
}

/// 单路编码参数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingParameters {
    /// 最大码率 (bps)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bitrate: Option<u32>,
    /// 最大帧率
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_framerate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_priority: Option<NetworkPriority>,
}

/// RTP 发送端参数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degradation_preference: Option<DegradationPreference>,
    #[serde(default)]
    pub encodings: Vec<EncodingParameters>,
}

impl SenderParameters {
    /// 当前生效的码率 (第一路编码)
    pub fn applied_bitrate(&self) -> Option<u32> {
        self.encodings.first().and_then(|e| e.max_bitrate)
    }
}

/// ideal/max 形式的约束区间
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstrainRange {
    pub ideal: u32,
    pub max: u32,
}

impl ConstrainRange {
    pub fn exact(value: u32) -> Self {
        Self {
            ideal: value,
            max: value,
        }
    }
}

/// 媒体轨道约束 (分辨率、帧率)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackConstraints {
    pub width: ConstrainRange,
    pub height: ConstrainRange,
    pub frame_rate: ConstrainRange,
}

/// 轨道类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// 单条统计记录
///
/// 只保留本模块关心的字段，其余字段在反序列化时忽略
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub report_type: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub transport_id: Option<String>,
    #[serde(default)]
    pub bytes_sent: Option<u64>,
    #[serde(default)]
    pub bytes_received: Option<u64>,
    #[serde(default)]
    pub packets_sent: Option<u64>,
    #[serde(default)]
    pub packets_lost: Option<i64>,
    /// 秒
    #[serde(default)]
    pub round_trip_time: Option<f64>,
    /// 秒
    #[serde(default)]
    pub current_round_trip_time: Option<f64>,
    /// 秒
    #[serde(default)]
    pub jitter: Option<f64>,
    #[serde(default)]
    pub frames_per_second: Option<f64>,
    #[serde(default)]
    pub frame_width: Option<u32>,
    #[serde(default)]
    pub frame_height: Option<u32>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub clock_rate: Option<u32>,
}

impl StatsEntry {
    pub fn new(id: impl Into<String>, report_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            report_type: report_type.into(),
            ..Default::default()
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind.as_deref() == Some("video")
    }
}

/// 一次 getStats 返回的统计报告
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatsReport {
    pub entries: Vec<StatsEntry>,
}

impl StatsReport {
    pub fn new(entries: Vec<StatsEntry>) -> Self {
        Self { entries }
    }

    /// 从 JSON 数组解码
    pub fn decode(buf: &[u8]) -> Result<Self, TransportError> {
        serde_json::from_slice(buf).map_err(Into::into)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StatsEntry> {
        self.entries.iter()
    }

    pub fn of_type<'a>(&'a self, report_type: &'a str) -> impl Iterator<Item = &'a StatsEntry> + 'a {
        self.entries.iter().filter(move |e| e.report_type == report_type)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 连接事件
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// 数据/控制通道已打开
    Opened,
    /// 收到观众发来的数据 (JSON 文本)
    DataReceived(String),
    /// 连接关闭
    Closed(CloseReason),
}

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// 主机结束会话
    HostTerminated,
    /// 观众断开
    ViewerDisconnected,
    /// 媒体轨道结束 (例如停止屏幕共享)
    TrackEnded,
    /// 连接建立或运行中出错
    Error(String),
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::HostTerminated => write!(f, "host terminated"),
            CloseReason::ViewerDisconnected => write!(f, "viewer disconnected"),
            CloseReason::TrackEnded => write!(f, "track ended"),
            CloseReason::Error(e) => write!(f, "error: {}", e),
        }
    }
}
