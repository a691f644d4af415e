//! 输入处理模块 - Input Agent
//!
//! 职责：
//! 1. 解析观众通过数据通道发来的手柄采样
//! 2. 去重 + 限流后经信令侧信道转发给主机输入服务
//!
//! 转发是尽力而为的：限流窗口内到达的新采样直接丢弃，不排队

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::transport::{SignalMessage, SignalingSink, TransportError};

/// 默认最小发送间隔
pub const DEFAULT_RELAY_INTERVAL: Duration = Duration::from_millis(5);

/// 手柄采样
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamepadSample {
    /// 输入源 ID (观众 ID + 手柄序号)
    pub id: String,
    pub axes: Vec<f64>,
    pub buttons: Vec<f64>,
}

impl GamepadSample {
    /// 用于比较的序列化状态
    fn state_key(&self) -> Result<String, TransportError> {
        serde_json::to_string(&(&self.axes, &self.buttons)).map_err(Into::into)
    }
}

/// 观众经数据通道发来的消息
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ViewerMessage {
    Joystick(GamepadSample),
    #[serde(other)]
    Unknown,
}

impl ViewerMessage {
    pub fn decode(text: &str) -> Result<Self, TransportError> {
        serde_json::from_str(text).map_err(Into::into)
    }
}

/// 单次转发结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Sent,
    /// 与该输入源上一次发送的状态相同
    Unchanged,
    /// 距上次发送不足最小间隔
    Throttled,
}

/// 控制通道转发器
pub struct ControlChannelRelay {
    sink: Arc<dyn SignalingSink>,
    min_interval: Duration,
    last_sent_at: Option<Instant>,
    /// (观众 ID, 输入源 ID) -> 上次发送的状态
    last_states: HashMap<(String, String), String>,
    sent: u64,
    dropped: u64,
}

impl ControlChannelRelay {
    pub fn new(sink: Arc<dyn SignalingSink>, min_interval: Duration) -> Self {
        Self {
            sink,
            min_interval,
            last_sent_at: None,
            last_states: HashMap::new(),
            sent: 0,
            dropped: 0,
        }
    }

    /// 转发一次采样，附带来源观众 ID
    pub async fn relay(
        &mut self,
        sample: GamepadSample,
        viewer_id: &str,
    ) -> Result<RelayOutcome, TransportError> {
        let key = (viewer_id.to_string(), sample.id.clone());
        let state = sample.state_key()?;

        if self.last_states.get(&key) == Some(&state) {
            return Ok(RelayOutcome::Unchanged);
        }

        let now = Instant::now();
        if let Some(last) = self.last_sent_at {
            if now.duration_since(last) < self.min_interval {
                self.dropped += 1;
                return Ok(RelayOutcome::Throttled);
            }
        }

        let message = SignalMessage::Joystick {
            peer_id: viewer_id.to_string(),
            id: sample.id,
            axes: sample.axes,
            buttons: sample.buttons,
        };
        self.sink.send(&message).await?;

        self.last_sent_at = Some(now);
        self.last_states.insert(key, state);
        self.sent += 1;
        Ok(RelayOutcome::Sent)
    }

    /// 观众离开后清除其输入源状态
    pub fn forget_viewer(&mut self, viewer_id: &str) {
        self.last_states.retain(|(viewer, _), _| viewer != viewer_id);
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
