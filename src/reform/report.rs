//! Diagnostic reports over a reformation pass.

use std::fmt;

use serde::Serialize;

use crate::error::Result;
use crate::utils::format_ticks;

use super::audio_sync::AudioDriftStats;

/// Audio drift summary of one reformation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftReport {
    /// Raw counters of the pass
    #[serde(flatten)]
    pub stats: AudioDriftStats,
    /// First modified video PTS; displayed times are relative to it
    pub stream_start: i64,
    /// Emitted frames that repeat an earlier one
    pub repeated_frames: u64,
    /// Mean placement error per emitted frame, in ticks
    pub avg_pts_diff: f64,
}

impl DriftReport {
    /// Summarizes `stats` for a stream whose first video frame is at
    /// `stream_start`.
    pub fn new(stats: &AudioDriftStats, stream_start: i64) -> Self {
        Self {
            stats: stats.clone(),
            stream_start,
            repeated_frames: stats.repeated_frames(),
            avg_pts_diff: stats.avg_pts_diff(),
        }
    }

    /// Compact JSON rendering.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Indented JSON rendering.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for DriftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(
            f,
            "audio frames: {} source, {} output ({} unique, {} repeated), {} skipped",
            s.source_frames, s.emitted_frames, s.unique_frames, self.repeated_frames, s.skipped_frames
        )?;
        writeln!(f, "resynchronizations: {}", s.resyncs)?;
        write!(
            f,
            "pts drift: avg {:.1} ticks, max {:.1} ticks",
            self.avg_pts_diff, s.max_pts_diff
        )?;
        if s.max_pts_diff > 0.0 {
            write!(
                f,
                " at {}",
                format_ticks((s.max_pts_diff_at - self.stream_start) as f64)
            )?;
        }
        writeln!(f)?;
        write!(f, "unfilled audio: {}", format_ticks(s.unfilled_ticks))
    }
}

/// One encoder slot in the timeline report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSummary {
    /// Slot index within the file
    pub slot: usize,
    /// Output format id
    pub format_id: usize,
    /// Video width in pixels
    pub width: u32,
    /// Video height in pixels
    pub height: u32,
    /// As `num/den`
    pub frame_rate: String,
    /// Audio channels encoded with the slot
    pub audio_channels: usize,
    /// Encoded frames in the slot
    pub frames: usize,
    /// Slot duration in ticks
    pub duration: f64,
}

/// Maps one output file back onto the source timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    /// Segmentation ordinal
    pub file: usize,
    /// Delivery ordinal; 0 is the main file
    pub delivery: usize,
    /// Modified PTS of the first encoded frame
    pub source_start: f64,
    /// End of the last encoded frame
    pub source_end: f64,
    /// Output duration in ticks
    pub duration: f64,
    /// Video frames assigned to the file
    pub total_frames: usize,
    /// Of those, frames that made it into the output
    pub encoded_frames: usize,
    /// Encoder slots in slot order
    pub slots: Vec<SlotSummary>,
}

/// Output files against the source timeline, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimelineReport {
    /// First modified video PTS, the origin of every time shown
    pub stream_start: i64,
    /// Output files in segmentation order
    pub files: Vec<FileSummary>,
}

impl TimelineReport {
    /// Compact JSON rendering.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Indented JSON rendering.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for TimelineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = self.stream_start as f64;
        for file in &self.files {
            writeln!(
                f,
                "file {} (#{}): {} - {} duration {} frames {}/{}",
                file.file,
                file.delivery,
                format_ticks(file.source_start - origin),
                format_ticks(file.source_end - origin),
                format_ticks(file.duration),
                file.encoded_frames,
                file.total_frames
            )?;
            for slot in &file.slots {
                writeln!(
                    f,
                    "  slot {}: format {} {}x{} @{} audio x{} frames {} duration {}",
                    slot.slot,
                    slot.format_id,
                    slot.width,
                    slot.height,
                    slot.frame_rate,
                    slot.audio_channels,
                    slot.frames,
                    format_ticks(slot.duration)
                )?;
            }
        }
        Ok(())
    }
}
