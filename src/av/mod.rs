use serde::{Deserialize, Serialize};

use crate::error::{ReformError, Result};

/// Elementary stream codecs seen in broadcast transport streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CodecType {
    /// MPEG-2 video
    #[default]
    MPEG2,
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,
    /// ADTS AAC
    AAC,
    /// MPEG-1 layer II audio
    MP2,
    /// Dolby AC-3
    AC3,
}

impl CodecType {
    /// Wire tag used by the snapshot format.
    pub fn tag(self) -> u8 {
        match self {
            CodecType::MPEG2 => 0,
            CodecType::H264 => 1,
            CodecType::H265 => 2,
            CodecType::AAC => 3,
            CodecType::MP2 => 4,
            CodecType::AC3 => 5,
        }
    }

    /// Returns true for video codecs.
    pub fn is_video(self) -> bool {
        matches!(self, CodecType::MPEG2 | CodecType::H264 | CodecType::H265)
    }
}

impl TryFrom<u8> for CodecType {
    type Error = ReformError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => CodecType::MPEG2,
            1 => CodecType::H264,
            2 => CodecType::H265,
            3 => CodecType::AAC,
            4 => CodecType::MP2,
            5 => CodecType::AC3,
            _ => {
                return Err(ReformError::InvalidData(format!(
                    "unknown codec tag {}",
                    value
                )))
            }
        })
    }
}

mod event;
mod format;
mod frame;

pub use event::*;
pub use format::*;
pub use frame::*;
