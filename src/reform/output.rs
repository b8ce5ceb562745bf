//! Per-file results handed to the muxer: delivery order, timecodes and
//! audio byte ranges.

use std::fmt::Write as _;

use serde::Serialize;

use crate::av::AudioFrame;
use crate::utils::ticks_to_millis;

use super::audio_sync::{FileTrack, Track};

/// One physical output file after reformation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputFile {
    /// Delivery ordinal; 0 is the main (longest) file
    pub delivery: usize,
    /// Output format id of every encoder slot
    pub formats: Vec<usize>,
    /// Synchronized video and audio of the file
    pub sync: FileTrack,
}

impl OutputFile {
    /// Segmentation ordinal of the file.
    pub fn file(&self) -> usize {
        self.sync.file
    }

    /// True for the file delivered first.
    pub fn is_main(&self) -> bool {
        self.delivery == 0
    }

    /// The whole file across all encoder slots.
    pub fn track(&self) -> &Track {
        &self.sync.track
    }

    /// Track of one encoder slot.
    pub fn slot(&self, slot: usize) -> Option<&Track> {
        self.sync.slots.get(slot)
    }

    /// Duration in ticks.
    pub fn duration(&self) -> f64 {
        self.sync.track.duration
    }

    /// Local start time of every frame, in ticks.
    pub fn timecodes(&self) -> &[f64] {
        &self.sync.track.timecodes
    }

    /// Source audio frame indices of `channel`, in output order.
    pub fn audio(&self, channel: usize) -> &[usize] {
        self.sync
            .track
            .audio
            .get(channel)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Frame timecodes in "timecode format v2": a header line, then one
    /// millisecond value per frame.
    pub fn timecode_v2(&self) -> String {
        let mut out = String::from("# timecode format v2\n");
        for &tc in self.timecodes() {
            let _ = writeln!(out, "{:.3}", ticks_to_millis(tc));
        }
        out
    }
}

/// Delivery ordinals for files of the given durations: the first longest
/// file gets 0, the rest 1..N in file order.
pub fn assign_delivery(durations: &[f64]) -> Vec<usize> {
    let main = durations
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &d)| match best {
            Some((_, bd)) if bd >= d => best,
            _ => Some((i, d)),
        })
        .map_or(0, |(i, _)| i);

    let mut next = 1;
    (0..durations.len())
        .map(|i| {
            if i == main {
                0
            } else {
                next += 1;
                next - 1
            }
        })
        .collect()
}

/// Source byte offsets of every audio frame, for re-extraction by frame
/// index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AudioOffsetTable {
    /// `offsets[i]` is frame `i`'s offset; the final entry is the end of the
    /// last frame.
    offsets: Vec<u64>,
    sizes: Vec<u32>,
}

impl AudioOffsetTable {
    /// Builds the table from the source audio frames.
    pub fn new(audio: &[AudioFrame]) -> Self {
        let mut offsets: Vec<u64> = audio.iter().map(|f| f.file_offset).collect();
        let sentinel = audio
            .last()
            .map_or(0, |f| f.file_offset + f.coded_size as u64);
        offsets.push(sentinel);
        Self {
            offsets,
            sizes: audio.iter().map(|f| f.coded_size).collect(),
        }
    }

    /// Number of audio frames, not counting the sentinel.
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// True when there are no audio frames.
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// All offsets including the trailing sentinel.
    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Byte offset of `frame`.
    pub fn offset(&self, frame: usize) -> Option<u64> {
        self.sizes.get(frame).map(|_| self.offsets[frame])
    }

    /// Coded size of `frame`.
    pub fn size(&self, frame: usize) -> Option<u32> {
        self.sizes.get(frame).copied()
    }

    /// End of the last frame.
    pub fn end(&self) -> u64 {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Collapses a frame index list into `(offset, length)` byte ranges.
    /// Consecutive indices whose bytes touch share one range; repeated or
    /// out-of-range indices start a new one or are dropped.
    pub fn byte_ranges(&self, frames: &[usize]) -> Vec<(u64, u64)> {
        let mut ranges: Vec<(u64, u64)> = Vec::new();
        let mut prev: Option<usize> = None;
        for &frame in frames {
            let (Some(offset), Some(size)) = (self.offset(frame), self.size(frame)) else {
                continue;
            };
            let size = size as u64;
            match (prev, ranges.last_mut()) {
                (Some(p), Some(range)) if frame == p + 1 && range.0 + range.1 == offset => {
                    range.1 += size;
                }
                _ => ranges.push((offset, size)),
            }
            prev = Some(frame);
        }
        ranges
    }
}
