//! 会话描述改写
//!
//! 只改动第一个视频媒体段：m= 行的负载列表与按负载类型区分的属性行
//! (rtpmap / fmtp / rtcp-fb)，其余内容逐字节保留

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::transport::{PeerConnection, SessionDescription, StatsReport, TransportError};

use super::CodecPreference;

const RTPMAP: &str = "a=rtpmap:";
const FMTP: &str = "a=fmtp:";
const RTCP_FB: &str = "a=rtcp-fb:";

/// 拆分行内容与行尾 ("\r\n" / "\n" / "")
fn split_eol(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, "\n")
    } else {
        (line, "")
    }
}

/// rtpmap 行 -> (负载类型, 编码名)
fn parse_rtpmap(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix(RTPMAP)?;
    let (payload_type, encoding) = rest.split_once(' ')?;
    let name = encoding.split('/').next()?;
    Some((payload_type, name))
}

/// 属性行引用的负载类型；"*" 与非负载属性返回 None
fn payload_type_of(content: &str) -> Option<&str> {
    let rest = [RTPMAP, FMTP, RTCP_FB]
        .iter()
        .find_map(|prefix| content.strip_prefix(prefix))?;
    let payload_type = rest.split(' ').next()?;
    if payload_type == "*" {
        None
    } else {
        Some(payload_type)
    }
}

/// 只保留 m= 行中的指定负载，头部字段 (媒体、端口、协议) 不变
fn rewrite_media_line(line: &str, retained: &HashSet<&str>) -> String {
    let (content, eol) = split_eol(line);
    let fields: Vec<&str> = content.split(' ').collect();
    if fields.len() < 3 {
        return line.to_string();
    }

    let mut rewritten: Vec<&str> = fields[..3].to_vec();
    rewritten.extend(fields[3..].iter().filter(|pt| retained.contains(*pt)));
    format!("{}{}", rewritten.join(" "), eol)
}

/// 限制视频编解码器
///
/// 找不到视频段或偏好中的编解码器都未提供时原样返回
pub fn restrict_video_codec(sdp: &str, preference: &CodecPreference) -> String {
    let lines: Vec<&str> = sdp.split_inclusive('\n').collect();

    let Some(start) = lines
        .iter()
        .position(|line| split_eol(line).0.starts_with("m=video"))
    else {
        return sdp.to_string();
    };
    let end = lines
        .iter()
        .skip(start + 1)
        .position(|line| line.starts_with("m="))
        .map(|offset| start + 1 + offset)
        .unwrap_or(lines.len());

    let block = &lines[start..end];
    let retained: HashSet<&str> = block
        .iter()
        .copied()
        .filter_map(|line| parse_rtpmap(split_eol(line).0))
        .filter(|(_, name)| preference.accepts(name))
        .map(|(payload_type, _)| payload_type)
        .collect();

    if retained.is_empty() {
        log::warn!(
            "None of {:?} offered in video section, leaving description unchanged",
            preference.mime_types()
        );
        return sdp.to_string();
    }

    let mut out = String::with_capacity(sdp.len());
    for line in &lines[..start] {
        out.push_str(line);
    }
    out.push_str(&rewrite_media_line(block[0], &retained));
    for line in block.iter().skip(1) {
        match payload_type_of(split_eol(line).0) {
            Some(payload_type) if !retained.contains(payload_type) => {}
            _ => out.push_str(line),
        }
    }
    for line in &lines[end..] {
        out.push_str(line);
    }

    out
}

/// 在设置本地描述前强制编解码器偏好的连接包装
///
/// 其他操作原样转发给内部连接
pub struct CodecEnforcingConnection {
    inner: Arc<dyn PeerConnection>,
    preference: CodecPreference,
}

impl CodecEnforcingConnection {
    pub fn new(inner: Arc<dyn PeerConnection>, preference: CodecPreference) -> Self {
        Self { inner, preference }
    }

    pub fn preference(&self) -> &CodecPreference {
        &self.preference
    }
}

#[async_trait]
impl PeerConnection for CodecEnforcingConnection {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        self.inner.create_offer().await
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        let sdp = restrict_video_codec(&description.sdp, &self.preference);
        self.inner
            .set_local_description(SessionDescription {
                sdp_type: description.sdp_type,
                sdp,
            })
            .await
    }

    async fn get_stats(&self) -> Result<StatsReport, TransportError> {
        self.inner.get_stats().await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}
