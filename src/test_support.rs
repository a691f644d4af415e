//! 测试辅助：外部协作者的内存实现

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::transport::*;

/// 音频在前、视频在中间、数据通道在后的典型 offer
pub const OFFER_SDP: &str = "v=0\r\n\
o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
a=group:BUNDLE 0 1 2\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111 0\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:0\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=fmtp:111 minptime=10;useinbandfec=1\r\n\
a=rtcp-fb:111 transport-cc\r\n\
a=rtpmap:0 PCMU/8000\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 96 97 98 100\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:1\r\n\
a=sendonly\r\n\
a=rtcp-fb:* transport-cc\r\n\
a=rtpmap:96 VP8/90000\r\n\
a=rtcp-fb:96 nack\r\n\
a=rtcp-fb:96 nack pli\r\n\
a=rtpmap:97 rtx/90000\r\n\
a=fmtp:97 apt=96\r\n\
a=rtpmap:98 VP9/90000\r\n\
a=rtcp-fb:98 nack\r\n\
a=fmtp:98 profile-id=0\r\n\
a=rtpmap:100 H264/90000\r\n\
a=rtcp-fb:100 nack\r\n\
a=fmtp:100 level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f\r\n\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n\
a=mid:2\r\n\
a=sctp-port:5000\r\n";

/// remote-inbound-rtp 视频条目
pub fn remote_inbound(lost: i64, rtt: f64) -> StatsEntry {
    StatsEntry {
        kind: Some("video".to_string()),
        packets_lost: Some(lost),
        round_trip_time: Some(rtt),
        ..StatsEntry::new("RIV1", "remote-inbound-rtp")
    }
}

/// transport 条目
pub fn transport_bytes(sent: u64, received: u64) -> StatsEntry {
    StatsEntry {
        bytes_sent: Some(sent),
        bytes_received: Some(received),
        packets_sent: Some(sent / 1_000),
        ..StatsEntry::new("T01", "transport")
    }
}

/// 可编排统计结果的对等连接
pub struct FakeConnection {
    stats: Mutex<VecDeque<Result<StatsReport, TransportError>>>,
    local_descriptions: Mutex<Vec<SessionDescription>>,
    offer_error: Mutex<Option<TransportError>>,
    stats_calls: AtomicUsize,
    closed: AtomicBool,
}

impl FakeConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            stats: Mutex::new(VecDeque::new()),
            local_descriptions: Mutex::new(Vec::new()),
            offer_error: Mutex::new(None),
            stats_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// 排队一次 getStats 结果；队列为空时返回空报告
    pub fn push_stats(&self, result: Result<StatsReport, TransportError>) {
        self.stats.lock().unwrap().push_back(result);
    }

    pub fn fail_offer(&self, error: TransportError) {
        *self.offer_error.lock().unwrap() = Some(error);
    }

    pub fn local_descriptions(&self) -> Vec<SessionDescription> {
        self.local_descriptions.lock().unwrap().clone()
    }

    pub fn stats_calls(&self) -> usize {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnection for FakeConnection {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        match self.offer_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(SessionDescription::offer(OFFER_SDP)),
        }
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        self.local_descriptions.lock().unwrap().push(description);
        Ok(())
    }

    async fn get_stats(&self) -> Result<StatsReport, TransportError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.stats
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(StatsReport::default()))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// 记录约束请求的轨道
pub struct FakeTrack {
    id: String,
    kind: TrackKind,
    constraints: Mutex<Vec<TrackConstraints>>,
    reject: AtomicBool,
    stopped: AtomicBool,
}

impl FakeTrack {
    pub fn new(id: &str, kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            constraints: Mutex::new(Vec::new()),
            reject: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn reject_constraints(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn applied_constraints(&self) -> Vec<TrackConstraints> {
        self.constraints.lock().unwrap().clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    async fn apply_constraints(&self, constraints: TrackConstraints) -> Result<(), TransportError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("OverconstrainedError".to_string()));
        }
        self.constraints.lock().unwrap().push(constraints);
        Ok(())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// 记录参数请求的发送端
pub struct FakeSender {
    track: Option<Arc<FakeTrack>>,
    parameters: Mutex<SenderParameters>,
    set_calls: AtomicUsize,
    reject: AtomicBool,
}

impl FakeSender {
    pub fn new(track: Option<Arc<FakeTrack>>) -> Arc<Self> {
        Arc::new(Self {
            track,
            parameters: Mutex::new(SenderParameters::default()),
            set_calls: AtomicUsize::new(0),
            reject: AtomicBool::new(false),
        })
    }

    pub fn video(id: &str) -> (Arc<Self>, Arc<FakeTrack>) {
        let track = FakeTrack::new(id, TrackKind::Video);
        (Self::new(Some(track.clone())), track)
    }

    pub fn reject_parameters(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn applied_bitrate(&self) -> Option<u32> {
        self.parameters.lock().unwrap().applied_bitrate()
    }
}

#[async_trait]
impl RtpSender for FakeSender {
    fn track(&self) -> Option<Arc<dyn MediaTrack>> {
        self.track
            .clone()
            .map(|track| track as Arc<dyn MediaTrack>)
    }

    fn get_parameters(&self) -> SenderParameters {
        self.parameters.lock().unwrap().clone()
    }

    async fn set_parameters(&self, parameters: SenderParameters) -> Result<(), TransportError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("InvalidModificationError".to_string()));
        }
        *self.parameters.lock().unwrap() = parameters;
        Ok(())
    }
}

/// 记录发出消息的信令
pub struct RecordingSink {
    messages: Mutex<Vec<SignalMessage>>,
    open: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(Vec::new()),
            open: AtomicBool::new(true),
        })
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<SignalMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalingSink for RecordingSink {
    async fn send(&self, message: &SignalMessage) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
