//! 会话管理模块 - Session Agent
//!
//! 职责：
//! 1. 房间码生成与解析
//! 2. 观众生命周期 (CONNECTING -> ACTIVE -> CLOSED)
//! 3. 为每个视频发送端挂接编解码器协商与质量控制循环
//! 4. 向上层发布主机事件
//!
//! 模块结构：
//! - viewer: 单个观众连接
//! - host: 主机会话与观众集合

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::quality::TierProfile;
use crate::transport::{CloseReason, ConstrainRange, TrackConstraints, TransportError};

pub mod host;
pub mod viewer;


pub use host::HostSession;
pub use viewer::ViewerSession;

/// 房间码字符表
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ROOM_CODE_LEN: usize = 4;

/// 会话错误
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid room code: {0:?}")]
    InvalidRoomCode(String),

    #[error("Unknown viewer: {0}")]
    UnknownViewer(String),

    #[error("Viewer already connected: {0}")]
    DuplicateViewer(String),

    #[error("Session has ended")]
    Ended,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Negotiation failed: {0}")]
    Negotiation(#[from] TransportError),
}

/// 观众连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    Connecting,
    Active,
    Closed,
}

/// 4 位房间码 (A-Z0-9)，碰撞不做处理
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let code = (0..ROOM_CODE_LEN)
            .map(|_| ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())] as char)
            .collect();
        RoomCode(code)
    }

    /// 解析用户输入，大小写不敏感
    pub fn parse(input: &str) -> Result<Self, SessionError> {
        let code = input.trim().to_ascii_uppercase();
        let valid = code.len() == ROOM_CODE_LEN
            && code.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b));
        if valid {
            Ok(RoomCode(code))
        } else {
            Err(SessionError::InvalidRoomCode(input.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 主机事件，替代界面提示
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    ViewerConnected { viewer_id: String },
    /// 首个视频发送端挂接完成，观众进入 ACTIVE
    StreamStarted { viewer_id: String },
    ViewerDisconnected { viewer_id: String, reason: CloseReason },
    ConnectionFailed { viewer_id: String, error: String },
    SessionEnded,
}

/// 音频采集约束
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConstraints {
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub echo_cancellation: bool,
    pub sample_rate: Option<u32>,
}

/// 屏幕采集约束
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub video: TrackConstraints,
    pub audio: AudioConstraints,
}

impl CaptureConstraints {
    /// 以 HIGH 档参数开始采集；游戏音频关闭语音处理
    pub fn for_profile(profile: &TierProfile) -> Self {
        Self {
            video: TrackConstraints {
                width: ConstrainRange::exact(profile.resolution.0),
                height: ConstrainRange::exact(profile.resolution.1),
                frame_rate: ConstrainRange::exact(profile.max_framerate),
            },
            audio: AudioConstraints {
                noise_suppression: false,
                auto_gain_control: false,
                echo_cancellation: false,
                sample_rate: profile.audio_sample_rate,
            },
        }
    }
}
