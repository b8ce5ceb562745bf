use serde::{Deserialize, Serialize};

use super::CodecType;
use crate::error::{ReformError, Result};
use crate::utils::PTS_HZ;

/// Frame rate as a rational number of frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FrameRate {
    /// Frames
    pub num: u32,
    /// Per this many seconds
    pub den: u32,
}

impl FrameRate {
    /// Rate of `num / den` frames per second.
    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// NTSC 29.97 fps.
    pub fn ntsc() -> Self {
        Self::new(30000, 1001)
    }

    /// Nominal frame period in 90 kHz ticks, or 0 for an unset rate.
    pub fn period_ticks(&self) -> f64 {
        if self.num == 0 {
            return 0.0;
        }
        PTS_HZ as f64 * self.den as f64 / self.num as f64
    }

    /// True when both terms are non-zero.
    pub fn is_valid(&self) -> bool {
        self.num != 0 && self.den != 0
    }
}

/// Video format descriptor carried by each video frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VideoFormat {
    /// Elementary stream codec
    pub codec: CodecType,
    /// Coded width in pixels
    pub width: u32,
    /// Coded height in pixels
    pub height: u32,
    /// Nominal rate; the frame period for fixed-rate timing
    pub frame_rate: FrameRate,
    /// False for interlaced content
    pub progressive: bool,
    /// False for variable frame rate content.
    pub fixed_rate: bool,
}

impl VideoFormat {
    /// Interlaced fixed-rate format.
    pub fn new(codec: CodecType, width: u32, height: u32, frame_rate: FrameRate) -> Self {
        Self {
            codec,
            width,
            height,
            frame_rate,
            progressive: false,
            fixed_rate: true,
        }
    }

    /// Sets whether the format is progressive.
    pub fn with_progressive(mut self, progressive: bool) -> Self {
        self.progressive = progressive;
        self
    }

    /// Sets whether frames follow the nominal rate.
    pub fn with_fixed_rate(mut self, fixed_rate: bool) -> Self {
        self.fixed_rate = fixed_rate;
        self
    }
}

/// Speaker layout of an audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChannelLayout {
    /// Not signalled
    #[default]
    Unknown,
    /// One channel
    Mono,
    /// Two independent mono programs
    DualMono,
    /// Two channels
    Stereo,
    /// 3/1
    Surround4,
    /// 3/2
    Surround5,
    /// 3/2 + LFE
    Surround5_1,
}

impl ChannelLayout {
    /// Number of speaker channels.
    pub fn channels(self) -> u32 {
        match self {
            ChannelLayout::Unknown => 0,
            ChannelLayout::Mono => 1,
            ChannelLayout::DualMono | ChannelLayout::Stereo => 2,
            ChannelLayout::Surround4 => 4,
            ChannelLayout::Surround5 => 5,
            ChannelLayout::Surround5_1 => 6,
        }
    }

    /// Wire tag used by the snapshot format.
    pub fn tag(self) -> u8 {
        match self {
            ChannelLayout::Unknown => 0,
            ChannelLayout::Mono => 1,
            ChannelLayout::DualMono => 2,
            ChannelLayout::Stereo => 3,
            ChannelLayout::Surround4 => 4,
            ChannelLayout::Surround5 => 5,
            ChannelLayout::Surround5_1 => 6,
        }
    }
}

impl TryFrom<u8> for ChannelLayout {
    type Error = ReformError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => ChannelLayout::Unknown,
            1 => ChannelLayout::Mono,
            2 => ChannelLayout::DualMono,
            3 => ChannelLayout::Stereo,
            4 => ChannelLayout::Surround4,
            5 => ChannelLayout::Surround5,
            6 => ChannelLayout::Surround5_1,
            _ => {
                return Err(ReformError::InvalidData(format!(
                    "unknown channel layout tag {}",
                    value
                )))
            }
        })
    }
}

/// Audio format descriptor carried by each audio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Elementary stream codec
    pub codec: CodecType,
    /// Samples per second
    pub sample_rate: u32,
    /// Speaker layout
    pub layout: ChannelLayout,
}

impl AudioFormat {
    /// Audio format with the given codec, rate and layout.
    pub fn new(codec: CodecType, sample_rate: u32, layout: ChannelLayout) -> Self {
        Self {
            codec,
            sample_rate,
            layout,
        }
    }
}

/// One encoder configuration: a video format plus the audio format of every
/// audio channel, bound to the output video file it is encoded into.
///
/// Equality ignores `id` and `video_file`; two records describing the same
/// formats are the same configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFormat {
    /// Dense id, equal to the position in the format table
    pub id: usize,
    /// Output file this configuration is encoded into
    pub video_file: usize,
    /// Video encoder input format
    pub video: VideoFormat,
    /// One entry per audio channel
    pub audio: Vec<AudioFormat>,
}

impl OutputFormat {
    /// Same video format and the same audio format on every channel.
    pub fn matches(&self, video: &VideoFormat, audio: &[AudioFormat]) -> bool {
        self.video == *video && self.audio == audio
    }

    /// Number of audio channels.
    pub fn num_channels(&self) -> usize {
        self.audio.len()
    }
}

impl PartialEq for OutputFormat {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.video, &other.audio)
    }
}

impl Eq for OutputFormat {}
