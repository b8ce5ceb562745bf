use serde::{Deserialize, Serialize};

/// An in-stream format change reported by the demultiplexer.
///
/// Each variant is anchored to the frame at which it takes effect. Video- and
/// channel-count events point at a video frame, audio events at an audio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatChange {
    /// The program table now declares `channels` audio streams.
    ChannelCountChanged {
        /// First video frame under the new table
        video_frame: usize,
        /// Number of audio streams
        channels: usize,
    },
    /// A new video format starts at `video_frame`; this always opens a new
    /// output file.
    VideoFormatChanged {
        /// First video frame in the new format
        video_frame: usize,
    },
    /// Audio stream `channel` switches to the format of `audio_frame`.
    AudioFormatChanged {
        /// First audio frame in the new format
        audio_frame: usize,
        /// Logical audio stream that changed
        channel: usize,
    },
}

impl FormatChange {
    /// Wire tag used by the snapshot format.
    pub fn tag(&self) -> u8 {
        match self {
            FormatChange::ChannelCountChanged { .. } => 0,
            FormatChange::VideoFormatChanged { .. } => 1,
            FormatChange::AudioFormatChanged { .. } => 2,
        }
    }

    /// True for `ChannelCountChanged`.
    pub fn is_channel_count_change(&self) -> bool {
        matches!(self, FormatChange::ChannelCountChanged { .. })
    }
}
