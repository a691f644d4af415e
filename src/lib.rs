pub mod codec;
pub mod config;
pub mod input;
pub mod quality;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use codec::{restrict_video_codec, CodecEnforcingConnection, CodecPreference, VideoCodec};
pub use config::{ConfigError, HostConfig};
pub use input::{ControlChannelRelay, GamepadSample, RelayOutcome};
pub use quality::{EncodingTier, MetricsAggregator, MetricsSnapshot, QualityController};
pub use session::{HostEvent, HostSession, RoomCode, SessionError, ViewerSession, ViewerState};
pub use transport::{
    ConnectionEvent, MediaCall, MediaTrack, PeerConnection, RtpSender, SignalingSink,
    TransportError, WebSocketSignaling,
};

/// 初始化日志，可重复调用
pub fn init_logging() {
    if env_logger::try_init().is_ok() {
        log::info!("Gamecast host core v{}", env!("CARGO_PKG_VERSION"));
    }
}
