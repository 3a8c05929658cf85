//! FLV audio/video tag body inspection
//!
//! Packets relayed between cluster nodes carry FLV tag bodies. The cluster
//! never decodes media, but it does need to recognize decoder configuration
//! records so a track can hand them to late joiners as its extra data.
//!
//! RTMP Video Data:
//! ```text
//! +----------+----------+
//! | FrameType| CodecID  | AVCPacketType | CodecData...
//! | (4 bits) | (4 bits) |    (8 bits)   |
//! +----------+----------+
//! ```
//!
//! RTMP Audio Data:
//! ```text
//! +-----------+---------+----------+----------+
//! |SoundFormat|SoundRate|SoundSize |SoundType | AACPacketType | AudioData...
//! | (4 bits)  | (2 bits)| (1 bit)  | (1 bit)  |    (8 bits)   |
//! +-----------+---------+----------+----------+
//! ```

/// Video codec ID (lower 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// Sorenson H.263
    SorensonH263 = 2,
    /// Screen video
    ScreenVideo = 3,
    /// VP6
    Vp6 = 4,
    /// VP6 with alpha
    Vp6Alpha = 5,
    /// Screen video v2
    ScreenVideoV2 = 6,
    /// AVC (H.264)
    Avc = 7,
    /// HEVC (H.265) - enhanced RTMP extension
    Hevc = 12,
}

impl VideoCodec {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            2 => Some(VideoCodec::SorensonH263),
            3 => Some(VideoCodec::ScreenVideo),
            4 => Some(VideoCodec::Vp6),
            5 => Some(VideoCodec::Vp6Alpha),
            6 => Some(VideoCodec::ScreenVideoV2),
            7 => Some(VideoCodec::Avc),
            12 => Some(VideoCodec::Hevc),
            _ => None,
        }
    }

    /// Whether packets of this codec carry a separate configuration record
    pub fn has_sequence_header(&self) -> bool {
        matches!(self, VideoCodec::Avc | VideoCodec::Hevc)
    }
}

/// Audio format (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// Linear PCM, platform endian
    LinearPcmPlatform = 0,
    /// ADPCM
    Adpcm = 1,
    /// MP3
    Mp3 = 2,
    /// Linear PCM, little endian
    LinearPcmLe = 3,
    /// G.711 A-law
    G711ALaw = 7,
    /// G.711 mu-law
    G711MuLaw = 8,
    /// AAC
    Aac = 10,
    /// Speex
    Speex = 11,
}

impl AudioFormat {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            0 => Some(AudioFormat::LinearPcmPlatform),
            1 => Some(AudioFormat::Adpcm),
            2 => Some(AudioFormat::Mp3),
            3 => Some(AudioFormat::LinearPcmLe),
            7 => Some(AudioFormat::G711ALaw),
            8 => Some(AudioFormat::G711MuLaw),
            10 => Some(AudioFormat::Aac),
            11 => Some(AudioFormat::Speex),
            _ => None,
        }
    }
}

/// Check if a video tag body is an AVC/HEVC decoder configuration record
pub fn is_video_sequence_header(data: &[u8]) -> bool {
    if data.len() < 2 {
        return false;
    }
    VideoCodec::from_byte(data[0])
        .map(|codec| codec.has_sequence_header() && data[1] == 0)
        .unwrap_or(false)
}

/// Check if an audio tag body is an AAC AudioSpecificConfig
pub fn is_audio_sequence_header(data: &[u8]) -> bool {
    data.len() >= 2 && AudioFormat::from_byte(data[0]) == Some(AudioFormat::Aac) && data[1] == 0
}
