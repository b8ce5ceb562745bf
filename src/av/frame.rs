use serde::{Deserialize, Serialize};

use super::{AudioFormat, VideoFormat};
use crate::error::{ReformError, Result};
use crate::utils::PTS_HZ;

/// Picture structure of a decoded video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PicStruct {
    /// Progressive frame
    #[default]
    Frame,
    /// Top field first
    Tff,
    /// Bottom field first
    Bff,
    /// Top field first, first field repeated
    TffRff,
    /// Bottom field first, first field repeated
    BffRff,
    /// Shown for two frame periods
    FrameDoubling,
    /// Shown for three frame periods
    FrameTripling,
}

impl PicStruct {
    /// Display duration of the frame in nominal frame periods, for fixed
    /// frame rate timing.
    ///
    /// Soft-telecined cadences (TFF, TFF+RFF, BFF, BFF+RFF) lay out on a frame
    /// grid once bottom-first pictures are pulled back half a period, which
    /// leaves the repeated field of BFF+RFF to fill a whole extra period.
    pub fn duration_factor(self) -> f64 {
        match self {
            PicStruct::Frame | PicStruct::Tff | PicStruct::Bff | PicStruct::TffRff => 1.0,
            PicStruct::BffRff | PicStruct::FrameDoubling => 2.0,
            PicStruct::FrameTripling => 3.0,
        }
    }

    /// Bottom-field-first pictures start half a period before their PTS.
    pub fn is_bottom_first(self) -> bool {
        matches!(self, PicStruct::Bff | PicStruct::BffRff)
    }

    /// Wire tag used by the snapshot format.
    pub fn tag(self) -> u8 {
        match self {
            PicStruct::Frame => 0,
            PicStruct::Tff => 1,
            PicStruct::Bff => 2,
            PicStruct::TffRff => 3,
            PicStruct::BffRff => 4,
            PicStruct::FrameDoubling => 5,
            PicStruct::FrameTripling => 6,
        }
    }
}

impl TryFrom<u8> for PicStruct {
    type Error = ReformError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => PicStruct::Frame,
            1 => PicStruct::Tff,
            2 => PicStruct::Bff,
            3 => PicStruct::TffRff,
            4 => PicStruct::BffRff,
            5 => PicStruct::FrameDoubling,
            6 => PicStruct::FrameTripling,
            _ => {
                return Err(ReformError::InvalidData(format!(
                    "unknown picture structure tag {}",
                    value
                )))
            }
        })
    }
}

/// A video frame as reported by the demultiplexer, in decode order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoFrame {
    /// Raw 33-bit presentation timestamp
    pub pts: i64,
    /// Picture structure, drives display duration
    pub pic: PicStruct,
    /// Format in effect for this frame
    pub format: VideoFormat,
}

impl VideoFrame {
    /// Progressive frame at raw PTS `pts`.
    pub fn new(pts: i64, format: VideoFormat) -> Self {
        Self {
            pts,
            pic: PicStruct::Frame,
            format,
        }
    }

    /// Sets the picture structure.
    pub fn with_pic(mut self, pic: PicStruct) -> Self {
        self.pic = pic;
        self
    }
}

/// An audio frame as reported by the demultiplexer, in decode order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFrame {
    /// Raw 33-bit presentation timestamp
    pub pts: i64,
    /// Duration in samples
    pub samples: u32,
    /// Format in effect for this frame
    pub format: AudioFormat,
    /// Logical audio stream this frame belongs to
    pub channel: usize,
    /// Byte offset of the coded frame in the extracted audio source
    pub file_offset: u64,
    /// Length of the coded frame in bytes
    pub coded_size: u32,
}

impl AudioFrame {
    /// Frame on channel 0 with no source bytes.
    pub fn new(pts: i64, samples: u32, format: AudioFormat) -> Self {
        Self {
            pts,
            samples,
            format,
            channel: 0,
            file_offset: 0,
            coded_size: 0,
        }
    }

    /// Assigns the frame to logical stream `channel`.
    pub fn with_channel(mut self, channel: usize) -> Self {
        self.channel = channel;
        self
    }

    /// Sets where the coded frame lives in the audio source.
    pub fn with_source(mut self, file_offset: u64, coded_size: u32) -> Self {
        self.file_offset = file_offset;
        self.coded_size = coded_size;
        self
    }

    /// Frame duration in 90 kHz ticks.
    pub fn duration_ticks(&self) -> f64 {
        if self.format.sample_rate == 0 {
            return 0.0;
        }
        self.samples as f64 * PTS_HZ as f64 / self.format.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::{ChannelLayout, CodecType};

    #[test]
    fn test_audio_duration() {
        let aac = AudioFormat::new(CodecType::AAC, 48000, ChannelLayout::Stereo);
        let frame = AudioFrame::new(0, 1024, aac).with_channel(1).with_source(4096, 512);
        assert_eq!(frame.duration_ticks(), 1920.0);
        assert_eq!(frame.channel, 1);
        assert_eq!(frame.file_offset, 4096);
    }

    #[test]
    fn test_telecine_cadence_is_contiguous() {
        // TFF, TFF+RFF, BFF, BFF+RFF at PTS 0, 1, 2.5, 3.5 periods
        let cadence = [
            (0.0, PicStruct::Tff),
            (1.0, PicStruct::TffRff),
            (2.5, PicStruct::Bff),
            (3.5, PicStruct::BffRff),
        ];
        let mut end = 0.0;
        for (pts, pic) in cadence {
            let start = if pic.is_bottom_first() { pts - 0.5 } else { pts };
            assert_eq!(start, end);
            end = start + pic.duration_factor();
        }
        assert_eq!(end, 5.0);
    }
}
