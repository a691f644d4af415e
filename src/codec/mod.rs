//! 编解码器协商模块
//!
//! 职责：
//! 1. 描述可接受的视频编解码器 (MIME 类型，有序)
//! 2. 改写发出的会话描述，只保留首选编解码器的负载类型

use serde::{Deserialize, Serialize};

pub mod negotiator;

pub use negotiator::{restrict_video_codec, CodecEnforcingConnection};

/// 视频编码格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoCodec {
    /// H.264 - 最广泛支持
    H264,
    VP8,
    VP9,
    /// AV1 - 下一代编解码器
    AV1,
    /// HEVC/H.265 - 更好压缩比
    HEVC,
}

impl VideoCodec {
    /// MIME 类型
    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoCodec::H264 => "video/H264",
            VideoCodec::VP8 => "video/VP8",
            VideoCodec::VP9 => "video/VP9",
            VideoCodec::AV1 => "video/AV1",
            VideoCodec::HEVC => "video/H265",
        }
    }
}

/// 编解码器偏好 (有序 MIME 类型集合)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodecPreference {
    mime_types: Vec<String>,
}

impl CodecPreference {
    /// 按给定顺序构造，重复项只保留第一次出现
    pub fn new<I, S>(mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for mime in mime_types {
            let mime = mime.into();
            if !unique.iter().any(|m| m.eq_ignore_ascii_case(&mime)) {
                unique.push(mime);
            }
        }
        Self { mime_types: unique }
    }

    pub fn only(codec: VideoCodec) -> Self {
        Self::new([codec.mime_type()])
    }

    /// rtpmap 中的编码名 (如 "VP9") 是否在偏好内
    pub fn accepts(&self, encoding_name: &str) -> bool {
        self.mime_types.iter().any(|mime| {
            mime.strip_prefix("video/")
                .unwrap_or(mime)
                .eq_ignore_ascii_case(encoding_name)
        })
    }

    pub fn mime_types(&self) -> &[String] {
        &self.mime_types
    }

    pub fn is_empty(&self) -> bool {
        self.mime_types.is_empty()
    }
}

impl Default for CodecPreference {
    fn default() -> Self {
        Self::only(VideoCodec::H264)
    }
}

impl From<Vec<VideoCodec>> for CodecPreference {
    fn from(codecs: Vec<VideoCodec>) -> Self {
        Self::new(codecs.iter().map(VideoCodec::mime_type))
    }
}
