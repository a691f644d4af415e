//! 主机会话
//!
//! 持有房间码、观众集合与共享的信令侧信道。
//! 外部对等连接层把每个观众的连接事件交给 `handle_event`，
//! 主机事件通过 mpsc 通道发给上层

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::{ConfigError, HostConfig};
use crate::input::{ControlChannelRelay, ViewerMessage};
use crate::quality::ViewerMetrics;
use crate::transport::{
    CloseReason, ConnectionEvent, MediaCall, SignalMessage, SignalingSink,
};

use super::{CaptureConstraints, HostEvent, RoomCode, SessionError, ViewerSession};

pub struct HostSession {
    config: HostConfig,
    room_code: RoomCode,
    signaling: Arc<dyn SignalingSink>,
    relay: ControlChannelRelay,
    viewers: HashMap<String, ViewerSession>,
    events: mpsc::UnboundedSender<HostEvent>,
    ended: bool,
}

impl HostSession {
    /// 创建会话；配置无效时拒绝
    pub fn new(
        config: HostConfig,
        signaling: Arc<dyn SignalingSink>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<HostEvent>), ConfigError> {
        config.validate()?;
        let (events, rx) = mpsc::unbounded_channel();
        let relay = ControlChannelRelay::new(signaling.clone(), config.relay_interval());
        let room_code = RoomCode::generate();
        log::info!("Hosting session {}", room_code);

        let session = Self {
            config,
            room_code,
            signaling,
            relay,
            viewers: HashMap::new(),
            events,
            ended: false,
        };
        Ok((session, rx))
    }

    pub fn room_code(&self) -> &RoomCode {
        &self.room_code
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// 创建对等连接时使用的 STUN 服务器
    pub fn ice_servers(&self) -> &[String] {
        &self.config.stun_servers
    }

    /// 屏幕采集应使用的初始约束 (HIGH 档)
    pub fn capture_constraints(&self) -> CaptureConstraints {
        CaptureConstraints::for_profile(&self.config.tier_table().high)
    }

    fn emit(&self, event: HostEvent) {
        if self.events.send(event).is_err() {
            log::debug!("Host event receiver dropped");
        }
    }

    /// 接受观众连接请求，未提供 ID 时分配一个
    pub fn accept_viewer(&mut self, viewer_id: Option<String>) -> Result<String, SessionError> {
        if self.ended {
            return Err(SessionError::Ended);
        }
        let id = viewer_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.viewers.contains_key(&id) {
            return Err(SessionError::DuplicateViewer(id));
        }
        log::info!("Accepted viewer {}", id);
        self.viewers.insert(id.clone(), ViewerSession::new(id.clone()));
        Ok(id)
    }

    /// 处理观众连接事件
    pub async fn handle_event(
        &mut self,
        viewer_id: &str,
        event: ConnectionEvent,
    ) -> Result<(), SessionError> {
        match event {
            ConnectionEvent::Opened => {
                let viewer = self
                    .viewers
                    .get_mut(viewer_id)
                    .ok_or_else(|| SessionError::UnknownViewer(viewer_id.to_string()))?;
                let activated = viewer.channel_opened();
                self.emit(HostEvent::ViewerConnected {
                    viewer_id: viewer_id.to_string(),
                });
                if activated {
                    self.emit(HostEvent::StreamStarted {
                        viewer_id: viewer_id.to_string(),
                    });
                }
                Ok(())
            }
            ConnectionEvent::DataReceived(text) => {
                if !self.viewers.contains_key(viewer_id) {
                    return Err(SessionError::UnknownViewer(viewer_id.to_string()));
                }
                self.relay_input(viewer_id, &text).await;
                Ok(())
            }
            ConnectionEvent::Closed(reason) => {
                if let CloseReason::Error(error) = &reason {
                    self.emit(HostEvent::ConnectionFailed {
                        viewer_id: viewer_id.to_string(),
                        error: error.clone(),
                    });
                }
                self.close_viewer(viewer_id, reason).await
            }
        }
    }

    /// 转发观众输入，失败只记录
    async fn relay_input(&mut self, viewer_id: &str, text: &str) {
        match ViewerMessage::decode(text) {
            Ok(ViewerMessage::Joystick(sample)) => {
                if let Err(e) = self.relay.relay(sample, viewer_id).await {
                    log::warn!("Failed to relay input from {}: {}", viewer_id, e);
                }
            }
            Ok(ViewerMessage::Unknown) => {
                log::debug!("Ignoring unknown message from {}", viewer_id);
            }
            Err(e) => {
                log::warn!("Malformed message from {}: {}", viewer_id, e);
            }
        }
    }

    /// 为观众挂接媒体呼叫
    ///
    /// 协商失败时通知上层并释放该观众的所有资源
    pub async fn attach_call(&mut self, viewer_id: &str, call: MediaCall) -> Result<(), SessionError> {
        let viewer = self
            .viewers
            .get_mut(viewer_id)
            .ok_or_else(|| SessionError::UnknownViewer(viewer_id.to_string()))?;

        match viewer.attach_call(call, &self.config).await {
            Ok(activated) => {
                if activated {
                    self.emit(HostEvent::StreamStarted {
                        viewer_id: viewer_id.to_string(),
                    });
                }
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to set up call for viewer {}: {}", viewer_id, e);
                self.emit(HostEvent::ConnectionFailed {
                    viewer_id: viewer_id.to_string(),
                    error: e.to_string(),
                });
                self.close_viewer(viewer_id, CloseReason::Error(e.to_string()))
                    .await?;
                Err(e)
            }
        }
    }

    /// 关闭并移除观众，通知信令侧信道
    pub async fn close_viewer(
        &mut self,
        viewer_id: &str,
        reason: CloseReason,
    ) -> Result<(), SessionError> {
        let mut viewer = self
            .viewers
            .remove(viewer_id)
            .ok_or_else(|| SessionError::UnknownViewer(viewer_id.to_string()))?;

        viewer.close(&reason).await;
        self.relay.forget_viewer(viewer_id);

        let notice = SignalMessage::PeerDisconnected {
            peer: viewer_id.to_string(),
        };
        if let Err(e) = self.signaling.send(&notice).await {
            log::warn!("Failed to announce disconnect of {}: {}", viewer_id, e);
        }

        self.emit(HostEvent::ViewerDisconnected {
            viewer_id: viewer_id.to_string(),
            reason,
        });
        Ok(())
    }

    /// 结束会话，关闭所有观众
    pub async fn end_session(&mut self) {
        if self.ended {
            return;
        }
        let ids: Vec<String> = self.viewers.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.close_viewer(&id, CloseReason::HostTerminated).await {
                log::warn!("Error closing viewer {}: {}", id, e);
            }
        }
        self.ended = true;
        log::info!("Session {} ended", self.room_code);
        self.emit(HostEvent::SessionEnded);
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    pub fn viewer(&self, viewer_id: &str) -> Option<&ViewerSession> {
        self.viewers.get(viewer_id)
    }

    pub fn viewer_metrics(&self, viewer_id: &str) -> Option<Vec<ViewerMetrics>> {
        self.viewers.get(viewer_id).map(ViewerSession::metrics)
    }
}
