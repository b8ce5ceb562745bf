//! Partition of the broadcast into format sections, output files and
//! encoder slots.

use std::collections::HashMap;

use log::{debug, info};
use serde::Serialize;

use crate::av::{AudioFormat, FormatChange, OutputFormat, VideoFormat};
use crate::config::ReformConfig;
use crate::error::{ReformError, Result};
use crate::utils::format_ticks;

use super::{Ledger, ModifiedPts};

/// Start of a section: every frame from `start` up to the next boundary is
/// encoded with `format_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionBoundary {
    /// Modified PTS
    pub start: i64,
    /// Output format of the section
    pub format_id: usize,
}

/// Result of segmenting one broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    /// All output formats; `formats[id].id == id`.
    pub formats: Vec<OutputFormat>,
    /// Boundary table, strictly increasing in `start`.
    pub sections: Vec<SectionBoundary>,
    /// Per output file, the format ids of its encoder slots in slot order.
    pub files: Vec<Vec<usize>>,
    /// Format id of every video frame.
    pub frame_formats: Vec<usize>,
    /// One tick past the last video frame.
    pub end: i64,
}

impl Segmentation {
    /// `[start, end)` of section `index`.
    pub fn section_range(&self, index: usize) -> Option<(i64, i64)> {
        let start = self.sections.get(index)?.start;
        let end = self
            .sections
            .get(index + 1)
            .map_or(self.end, |next| next.start);
        Some((start, end))
    }

    /// Encoder slot of `format_id` within its output file.
    pub fn slot_of(&self, format_id: usize) -> Result<usize> {
        let format = self.formats.get(format_id).ok_or_else(|| {
            ReformError::internal(format!("format id {} does not exist", format_id))
        })?;
        self.files
            .get(format.video_file)
            .and_then(|slots| slots.iter().position(|&id| id == format_id))
            .ok_or_else(|| {
                ReformError::internal(format!(
                    "format {} is not an encoder slot of file {}",
                    format_id, format.video_file
                ))
            })
    }
}

/// Resolves every event to the modified PTS of the frame it references.
/// References past the end of the capture resolve to one tick after the last
/// video frame: the change never took effect.
pub fn event_pts(ledger: &Ledger, pts: &ModifiedPts) -> Vec<i64> {
    let (_, last) = pts.video_span();
    ledger
        .events()
        .iter()
        .map(|ev| {
            let resolved = match *ev {
                FormatChange::ChannelCountChanged { video_frame, .. }
                | FormatChange::VideoFormatChanged { video_frame } => pts.video.get(video_frame),
                FormatChange::AudioFormatChanged { audio_frame, .. } => pts.audio.get(audio_frame),
            };
            resolved.copied().unwrap_or(last + 1)
        })
        .collect()
}

/// Builds the section table and assigns every video frame to a format.
pub fn segment(ledger: &Ledger, pts: &ModifiedPts, config: &ReformConfig) -> Result<Segmentation> {
    let tolerance = config.section_merge_tolerance_ticks();
    let (first, last) = pts.video_span();
    let times = event_pts(ledger, pts);

    let mut builder = SectionBuilder::new(first);
    let mut video: Option<VideoFormat> = None;
    let mut audio: Vec<AudioFormat> = Vec::new();
    let mut video_file: i64 = -1;
    let mut pending: Option<i64> = None;

    for (ev, &at) in ledger.events().iter().zip(&times) {
        if at > last {
            debug!("{:?} lies past the end of the stream and is ignored", ev);
            continue;
        }

        // Changes signalled close together form a single transition
        if let Some(start) = pending {
            if (at - start) as f64 > tolerance {
                builder.close(start, video_file, video.as_ref(), &audio)?;
                pending = None;
            } else {
                debug!(
                    "{:?} at {} folded into section at {}",
                    ev,
                    format_ticks(at as f64),
                    format_ticks(start as f64)
                );
            }
        }

        match *ev {
            FormatChange::ChannelCountChanged { channels, .. } => {
                if audio.len() != channels {
                    audio.resize(channels, AudioFormat::default());
                    pending.get_or_insert(at);
                }
            }
            FormatChange::VideoFormatChanged { video_frame } => {
                video_file += 1;
                video = Some(ledger.video()[video_frame].format);
                // A new file starts exactly at its own change
                pending = Some(at);
            }
            FormatChange::AudioFormatChanged {
                audio_frame,
                channel,
            } => {
                if channel >= audio.len() {
                    return Err(ReformError::format(format!(
                        "audio format change on channel {} but only {} channels are declared",
                        channel,
                        audio.len()
                    )));
                }
                audio[channel] = ledger.audio()[audio_frame].format;
                pending.get_or_insert(at);
            }
        }
    }
    if let Some(start) = pending {
        builder.close(start, video_file, video.as_ref(), &audio)?;
    }

    let mut seg = builder.finish(last + 1)?;
    seg.frame_formats = assign_frames(&seg.sections, &pts.video)?;

    info!(
        "{} sections, {} output formats in {} output files",
        seg.sections.len(),
        seg.formats.len(),
        seg.files.len()
    );
    for (i, section) in seg.sections.iter().enumerate() {
        let format = &seg.formats[section.format_id];
        info!(
            "section {}: from {} format {} (file {}, {}x{}, {} audio channels)",
            i,
            format_ticks((section.start - first) as f64),
            format.id,
            format.video_file,
            format.video.width,
            format.video.height,
            format.audio.len()
        );
    }
    Ok(seg)
}

/// Maps each frame to the format of the last section starting at or before it.
fn assign_frames(sections: &[SectionBoundary], video_pts: &[i64]) -> Result<Vec<usize>> {
    video_pts
        .iter()
        .enumerate()
        .map(|(i, &at)| {
            let pos = sections.partition_point(|s| s.start <= at);
            if pos == 0 {
                return Err(ReformError::internal(format!(
                    "video frame {} at PTS {} precedes every section",
                    i, at
                )));
            }
            Ok(sections[pos - 1].format_id)
        })
        .collect()
}

struct SectionBuilder {
    first: i64,
    formats: Vec<OutputFormat>,
    sections: Vec<SectionBoundary>,
    files: Vec<Vec<usize>>,
    /// Raw video file counter -> dense file id
    file_ids: HashMap<i64, usize>,
}

impl SectionBuilder {
    fn new(first: i64) -> Self {
        Self {
            first,
            formats: Vec::new(),
            sections: Vec::new(),
            files: Vec::new(),
            file_ids: HashMap::new(),
        }
    }

    fn close(
        &mut self,
        start: i64,
        video_file: i64,
        video: Option<&VideoFormat>,
        audio: &[AudioFormat],
    ) -> Result<()> {
        let video = video.ok_or_else(|| {
            ReformError::format(format!(
                "format section at {} starts before any video format is declared",
                start
            ))
        })?;

        let files = &mut self.files;
        let file = *self.file_ids.entry(video_file).or_insert_with(|| {
            files.push(Vec::new());
            files.len() - 1
        });

        // Only formats of the open file are candidates; other files are
        // separate containers even when their formats match.
        let existing = self.files[file]
            .iter()
            .copied()
            .find(|&id| self.formats[id].matches(video, audio));
        let format_id = match existing {
            Some(id) => id,
            None => {
                let id = self.formats.len();
                self.formats.push(OutputFormat {
                    id,
                    video_file: file,
                    video: *video,
                    audio: audio.to_vec(),
                });
                self.files[file].push(id);
                id
            }
        };

        let start = if self.sections.is_empty() {
            self.first
        } else {
            start
        };
        if let Some(prev) = self.sections.last_mut() {
            if start <= prev.start {
                debug!(
                    "section at {} replaces empty section at {}",
                    start, prev.start
                );
                prev.format_id = format_id;
                return Ok(());
            }
        }
        self.sections.push(SectionBoundary { start, format_id });
        Ok(())
    }

    /// Drops formats no section refers to and renumbers formats and files
    /// densely.
    fn finish(self, end: i64) -> Result<Segmentation> {
        if self.sections.is_empty() {
            return Err(ReformError::format("stream declares no format section"));
        }

        let mut used = vec![false; self.formats.len()];
        for section in &self.sections {
            used[section.format_id] = true;
        }

        let mut format_map = vec![usize::MAX; self.formats.len()];
        let mut formats = Vec::new();
        let mut files = Vec::new();
        for slots in &self.files {
            let kept: Vec<usize> = slots.iter().copied().filter(|&id| used[id]).collect();
            if kept.is_empty() {
                continue;
            }
            let file = files.len();
            let mut slot_ids = Vec::with_capacity(kept.len());
            for old in kept {
                let id = formats.len();
                format_map[old] = id;
                formats.push(OutputFormat {
                    id,
                    video_file: file,
                    ..self.formats[old].clone()
                });
                slot_ids.push(id);
            }
            files.push(slot_ids);
        }

        let sections = self
            .sections
            .iter()
            .map(|s| SectionBoundary {
                start: s.start,
                format_id: format_map[s.format_id],
            })
            .collect();

        Ok(Segmentation {
            formats,
            sections,
            files,
            frame_formats: Vec::new(),
            end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::{AudioFrame, ChannelLayout, CodecType, FrameRate, VideoFrame};
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    const PERIOD: i64 = 3003;

    fn hd() -> VideoFormat {
        VideoFormat::new(CodecType::MPEG2, 1440, 1080, FrameRate::ntsc())
    }

    fn sd() -> VideoFormat {
        VideoFormat::new(CodecType::MPEG2, 720, 480, FrameRate::ntsc())
    }

    fn stereo() -> AudioFormat {
        AudioFormat::new(CodecType::AAC, 48000, ChannelLayout::Stereo)
    }

    fn surround() -> AudioFormat {
        AudioFormat::new(CodecType::AAC, 48000, ChannelLayout::Surround5_1)
    }

    /// One video frame per period, one audio frame per channel every 1920 ticks.
    fn build(
        formats: &[VideoFormat],
        audio_formats: &[AudioFormat],
        events: Vec<FormatChange>,
    ) -> (Ledger, ModifiedPts) {
        let video: Vec<VideoFrame> = formats
            .iter()
            .enumerate()
            .map(|(i, f)| VideoFrame::new(i as i64 * PERIOD, *f))
            .collect();
        let audio: Vec<AudioFrame> = audio_formats
            .iter()
            .enumerate()
            .map(|(i, f)| AudioFrame::new(i as i64 * 1920, 1024, *f))
            .collect();
        let ledger = Ledger::new(video, audio, events).unwrap();
        let pts = ModifiedPts::from_ledger(&ledger, 60 * 90_000).unwrap();
        (ledger, pts)
    }

    fn opening(channels: usize) -> Vec<FormatChange> {
        vec![
            FormatChange::ChannelCountChanged {
                video_frame: 0,
                channels,
            },
            FormatChange::VideoFormatChanged { video_frame: 0 },
            FormatChange::AudioFormatChanged {
                audio_frame: 0,
                channel: 0,
            },
        ]
    }

    #[test]
    fn test_single_section() {
        let (ledger, pts) = build(&[hd(); 100], &[stereo(); 100], opening(1));
        let seg = segment(&ledger, &pts, &ReformConfig::default()).unwrap();
        assert_eq!(seg.sections, vec![SectionBoundary { start: 0, format_id: 0 }]);
        assert_eq!(seg.files, vec![vec![0]]);
        assert_eq!(seg.formats[0].audio, vec![stereo()]);
        assert!(seg.frame_formats.iter().all(|&f| f == 0));
    }

    #[test]
    fn test_video_change_opens_new_file() {
        let mut formats = vec![hd(); 200];
        formats[120..].fill(sd());
        let mut events = opening(1);
        events.push(FormatChange::VideoFormatChanged { video_frame: 120 });
        let (ledger, pts) = build(&formats, &[stereo(); 300], events);
        let seg = segment(&ledger, &pts, &ReformConfig::default()).unwrap();

        assert_eq!(seg.files.len(), 2);
        assert_eq!(
            seg.sections,
            vec![
                SectionBoundary { start: 0, format_id: 0 },
                SectionBoundary { start: 120 * PERIOD, format_id: 1 },
            ]
        );
        assert_eq!(seg.formats[1].video, sd());
        assert_eq!(seg.formats[1].video_file, 1);
        assert_eq!(seg.frame_formats[119], 0);
        assert_eq!(seg.frame_formats[120], 1);
    }

    #[test]
    fn test_close_changes_fold_last_value_wins() {
        // Two audio updates 1 second apart fold into one section starting at the first
        let mut audio = vec![stereo(); 400];
        audio[300] = surround();
        audio[301..].fill(stereo());
        audio[350..].fill(surround());
        let mut events = opening(1);
        events.push(FormatChange::AudioFormatChanged { audio_frame: 300, channel: 0 });
        events.push(FormatChange::AudioFormatChanged { audio_frame: 301, channel: 0 });
        events.push(FormatChange::AudioFormatChanged { audio_frame: 350, channel: 0 });
        let (ledger, pts) = build(&[hd(); 300], &audio, events);
        let seg = segment(&ledger, &pts, &ReformConfig::default()).unwrap();

        assert_eq!(seg.sections.len(), 2);
        assert_eq!(seg.sections[1].start, 300 * 1920);
        assert_eq!(seg.formats[seg.sections[1].format_id].audio, vec![surround()]);
    }

    #[test]
    fn test_equal_formats_are_deduplicated_within_file() {
        // stereo -> surround -> stereo: the third section reuses format 0
        let mut audio = vec![stereo(); 1000];
        audio[300..600].fill(surround());
        let mut events = opening(1);
        events.push(FormatChange::AudioFormatChanged { audio_frame: 300, channel: 0 });
        events.push(FormatChange::AudioFormatChanged { audio_frame: 600, channel: 0 });
        let (ledger, pts) = build(&[hd(); 700], &audio, events);
        let seg = segment(&ledger, &pts, &ReformConfig::default()).unwrap();

        let ids: Vec<usize> = seg.sections.iter().map(|s| s.format_id).collect();
        assert_eq!(ids, vec![0, 1, 0]);
        assert_eq!(seg.files, vec![vec![0, 1]]);
    }

    #[test]
    fn test_formats_are_not_shared_across_files() {
        let mut events = opening(1);
        events.push(FormatChange::VideoFormatChanged { video_frame: 200 });
        let (ledger, pts) = build(&[hd(); 400], &[stereo(); 700], events);
        let seg = segment(&ledger, &pts, &ReformConfig::default()).unwrap();
        // Same formats, different containers
        assert_eq!(seg.files, vec![vec![0], vec![1]]);
        assert_eq!(seg.formats[0], seg.formats[1]);
    }

    #[test]
    fn test_undeclared_channel_is_format_error() {
        let mut events = opening(1);
        events.push(FormatChange::AudioFormatChanged { audio_frame: 10, channel: 1 });
        let (ledger, pts) = build(&[hd(); 100], &[stereo(); 100], events);
        let err = segment(&ledger, &pts, &ReformConfig::default()).unwrap_err();
        assert!(err.is_format_error());
    }

    #[test]
    fn test_change_past_end_never_takes_effect() {
        let mut events = opening(1);
        events.push(FormatChange::VideoFormatChanged { video_frame: 5000 });
        let (ledger, pts) = build(&[hd(); 100], &[stereo(); 100], events);
        let seg = segment(&ledger, &pts, &ReformConfig::default()).unwrap();
        assert_eq!(seg.files.len(), 1);
        assert_eq!(seg.sections.len(), 1);
        assert_eq!(event_pts(&ledger, &pts)[3], 99 * PERIOD + 1);
    }

    #[test]
    fn test_channel_count_change_adds_slot() {
        let mut events = opening(1);
        events.push(FormatChange::ChannelCountChanged { video_frame: 150, channels: 2 });
        events.push(FormatChange::AudioFormatChanged { audio_frame: 250, channel: 1 });
        let (ledger, pts) = build(&[hd(); 300], &[stereo(); 500], events);
        let seg = segment(&ledger, &pts, &ReformConfig::default()).unwrap();

        assert_eq!(seg.files, vec![vec![0, 1]]);
        assert_eq!(seg.formats[0].audio.len(), 1);
        assert_eq!(seg.formats[1].audio.len(), 2);
        assert_eq!(seg.formats[1].audio[1], stereo());
        assert_eq!(seg.sections[1].start, 150 * PERIOD);
    }

    #[quickcheck]
    fn prop_sections_cover_timeline(changes: Vec<u8>) -> bool {
        // Random video/audio changes spread over the stream
        let frames = 2000usize;
        let mut events = opening(1);
        for (k, c) in changes.iter().enumerate().take(20) {
            let frame = (*c as usize * 7 + k * 13) % frames;
            if c % 2 == 0 {
                events.push(FormatChange::VideoFormatChanged { video_frame: frame });
            } else {
                events.push(FormatChange::AudioFormatChanged { audio_frame: frame, channel: 0 });
            }
        }
        let (ledger, pts) = build(&vec![hd(); frames], &vec![stereo(); frames * 2], events);
        let config = ReformConfig::default();
        let seg = segment(&ledger, &pts, &config).unwrap();
        let again = segment(&ledger, &pts, &config).unwrap();

        let (first, last) = pts.video_span();
        let mut cursor = first;
        for i in 0..seg.sections.len() {
            let (start, end) = seg.section_range(i).unwrap();
            if start != cursor || end <= start {
                return false;
            }
            cursor = end;
        }
        cursor == last + 1 && seg == again
    }
}
