//! WebSocket 信令侧信道
//!
//! 主机通过一条持久 WebSocket 连接把手柄输入和观众断开通知转发给本地输入服务
//! 写入由后台任务串行完成，调用方只把消息放进队列

use super::protocol::*;
use super::SignalingSink;
use crate::config::HostConfig;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// 活动的写入端
struct Writer {
    tx: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

impl Writer {
    fn is_open(&self) -> bool {
        !self.tx.is_closed() && !self.task.is_finished()
    }
}

/// WebSocket 信令客户端
pub struct WebSocketSignaling {
    url: String,
    writer: Mutex<Option<Writer>>,
}

impl WebSocketSignaling {
    /// 连接到信令服务
    pub async fn connect(url: impl Into<String>) -> Result<Self, TransportError> {
        let url = url.into();
        let writer = open_writer(&url).await?;
        log::info!("Signaling connected to {}", url);
        Ok(Self {
            url,
            writer: Mutex::new(Some(writer)),
        })
    }

    /// 连接到配置中的信令地址
    pub async fn from_config(config: &HostConfig) -> Result<Self, TransportError> {
        Self::connect(config.signaling_url.clone()).await
    }

    /// 重新建立连接，替换旧的写入端
    pub async fn reconnect(&self) -> Result<(), TransportError> {
        self.close();
        let writer = open_writer(&self.url).await?;
        match self.writer.lock() {
            Ok(mut guard) => {
                *guard = Some(writer);
                log::info!("Signaling reconnected to {}", self.url);
                Ok(())
            }
            Err(_) => {
                writer.task.abort();
                Err(TransportError::Connection("signaling state poisoned".to_string()))
            }
        }
    }

    /// 关闭连接，队列中未发送的消息被丢弃
    pub fn close(&self) {
        if let Ok(mut guard) = self.writer.lock() {
            if let Some(writer) = guard.take() {
                writer.task.abort();
                log::info!("Signaling closed");
            }
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SignalingSink for WebSocketSignaling {
    async fn send(&self, message: &SignalMessage) -> Result<(), TransportError> {
        let text = message.encode()?;
        let guard = self
            .writer
            .lock()
            .map_err(|_| TransportError::Connection("signaling state poisoned".to_string()))?;
        match guard.as_ref() {
            Some(writer) if writer.is_open() => writer
                .tx
                .send(text)
                .map_err(|_| TransportError::Closed),
            _ => Err(TransportError::NotConnected),
        }
    }

    fn is_open(&self) -> bool {
        self.writer
            .lock()
            .map(|guard| guard.as_ref().map(Writer::is_open).unwrap_or(false))
            .unwrap_or(false)
    }
}

impl Drop for WebSocketSignaling {
    fn drop(&mut self) {
        self.close();
    }
}

async fn open_writer(url: &str) -> Result<Writer, TransportError> {
    let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| TransportError::Connection(format!("WS connect failed: {}", e)))?;

    let (mut ws_write, mut ws_read) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                outgoing = rx.recv() => match outgoing {
                    Some(text) => {
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            log::error!("Signaling send failed: {}", e);
                            break;
                        }
                    }
                    None => {
                        let _ = ws_write.close().await;
                        break;
                    }
                },
                incoming = ws_read.next() => match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        log::warn!("Signaling socket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
        log::debug!("Signaling writer stopped");
    });

    Ok(Writer { tx, task })
}
