//! Validated demultiplexer output.

use crate::av::{AudioFrame, FormatChange, VideoFrame};
use crate::error::{ReformError, Result};

/// The three input sequences of one broadcast file, validated once and never
/// modified afterwards. Positions in these vectors are the frame and event
/// identities used everywhere else in the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    video: Vec<VideoFrame>,
    audio: Vec<AudioFrame>,
    events: Vec<FormatChange>,
}

impl Ledger {
    /// Takes ownership of the demultiplexer output.
    ///
    /// # Errors
    ///
    /// Returns `ReformError::Format` if either frame list is empty, if the
    /// first event is not a channel-count change, or if an audio frame has no
    /// sample rate.
    pub fn new(
        video: Vec<VideoFrame>,
        audio: Vec<AudioFrame>,
        events: Vec<FormatChange>,
    ) -> Result<Self> {
        if video.is_empty() {
            return Err(ReformError::format("no video frames in stream"));
        }
        if audio.is_empty() {
            return Err(ReformError::format("no audio frames in stream"));
        }
        match events.first() {
            Some(ev) if ev.is_channel_count_change() => {}
            Some(ev) => {
                return Err(ReformError::format(format!(
                    "stream must start with a channel count declaration, got {:?}",
                    ev
                )))
            }
            None => return Err(ReformError::format("no format change events in stream")),
        }
        if let Some((i, frame)) = audio
            .iter()
            .enumerate()
            .find(|(_, f)| f.format.sample_rate == 0)
        {
            return Err(ReformError::format(format!(
                "audio frame {} (channel {}) has no sample rate",
                i, frame.channel
            )));
        }

        Ok(Self {
            video,
            audio,
            events,
        })
    }

    /// Video frames in decode order.
    pub fn video(&self) -> &[VideoFrame] {
        &self.video
    }

    /// Audio frames of all channels in decode order.
    pub fn audio(&self) -> &[AudioFrame] {
        &self.audio
    }

    /// Format change events in stream order.
    pub fn events(&self) -> &[FormatChange] {
        &self.events
    }

    /// Number of logical audio streams: the widest channel count declared by
    /// an event or referenced by an audio frame.
    pub fn num_channels(&self) -> usize {
        let declared = self
            .events
            .iter()
            .filter_map(|ev| match *ev {
                FormatChange::ChannelCountChanged { channels, .. } => Some(channels),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        let used = self
            .audio
            .iter()
            .map(|f| f.channel + 1)
            .max()
            .unwrap_or(0);
        declared.max(used)
    }

    /// Source positions of every audio frame belonging to `channel`, in
    /// decode order.
    pub fn channel_frames(&self, channel: usize) -> Vec<usize> {
        self.audio
            .iter()
            .enumerate()
            .filter(|(_, f)| f.channel == channel)
            .map(|(i, _)| i)
            .collect()
    }
}
