//! # Stream reformation
//!
//! Turns the flat frame and event record of one broadcast capture into
//! output files ready for encoding and muxing.
//!
//! Processing runs in two phases:
//!
//! 1. [`StreamReformer::new`] normalizes timestamps and segments the stream
//!    into format sections, output files and encoder slots. The dispatch
//!    queries ([`StreamReformer::encoder_frames`] and friends) are usable from
//!    then on, and encode workers report finished frames through
//!    [`StreamReformer::mark_encoded`] from any thread.
//! 2. Once every worker is done, [`StreamReformer::reform`] rebuilds the audio
//!    of every output file against the encoded video and numbers the files for
//!    delivery.
//!
//! ```rust
//! use tsreform::av::*;
//! use tsreform::config::ReformConfig;
//! use tsreform::reform::{Ledger, StreamReformer};
//!
//! # fn main() -> tsreform::Result<()> {
//! let video_format = VideoFormat::new(CodecType::MPEG2, 1440, 1080, FrameRate::ntsc());
//! let audio_format = AudioFormat::new(CodecType::AAC, 48000, ChannelLayout::Stereo);
//! let video = (0..30).map(|i| VideoFrame::new(i * 3003, video_format)).collect();
//! let audio = (0..47).map(|i| AudioFrame::new(i * 1920, 1024, audio_format)).collect();
//! let events = vec![
//!     FormatChange::ChannelCountChanged { video_frame: 0, channels: 1 },
//!     FormatChange::VideoFormatChanged { video_frame: 0 },
//!     FormatChange::AudioFormatChanged { audio_frame: 0, channel: 0 },
//! ];
//!
//! let mut reformer = StreamReformer::new(Ledger::new(video, audio, events)?, ReformConfig::default())?;
//! for frame in reformer.encoder_frames(0, 0)? {
//!     reformer.mark_encoded(frame)?;
//! }
//! reformer.reform()?;
//! assert_eq!(reformer.outputs()[0].track().frames.len(), 30);
//! # Ok(())
//! # }
//! ```

pub mod audio_sync;
pub mod frame_map;
pub mod ledger;
pub mod output;
pub mod pts;
pub mod report;
pub mod segment;


pub use audio_sync::{AudioDriftStats, AudioSynchronizer, FileTrack, Track};
pub use frame_map::FrameMap;
pub use ledger::Ledger;
pub use output::{AudioOffsetTable, OutputFile};
pub use pts::ModifiedPts;
pub use report::{DriftReport, FileSummary, SlotSummary, TimelineReport};
pub use segment::{SectionBoundary, Segmentation};

use log::info;

use crate::av::OutputFormat;
use crate::config::ReformConfig;
use crate::error::{ReformError, Result};
use crate::utils::format_ticks;

/// The reformation engine for one input stream.
#[derive(Debug)]
pub struct StreamReformer {
    config: ReformConfig,
    ledger: Ledger,
    pts: ModifiedPts,
    seg: Segmentation,
    map: FrameMap,
    /// Per output file, all of its video frames in presentation order
    file_frames: Vec<Vec<usize>>,
    offsets: AudioOffsetTable,
    outputs: Vec<OutputFile>,
    stats: AudioDriftStats,
}

impl StreamReformer {
    /// Normalizes timestamps and segments the stream.
    ///
    /// # Errors
    ///
    /// `ReformError::Format` for streams without a coherent configuration,
    /// `ReformError::Config` for unusable tuning values.
    pub fn new(ledger: Ledger, config: ReformConfig) -> Result<Self> {
        config.validate()?;
        let pts = ModifiedPts::from_ledger(&ledger, config.max_pts_regression_ticks())?;
        let seg = segment::segment(&ledger, &pts, &config)?;

        let mut file_frames = vec![Vec::new(); seg.files.len()];
        for (v, &format_id) in seg.frame_formats.iter().enumerate() {
            file_frames[seg.formats[format_id].video_file].push(v);
        }
        let file_frames = file_frames
            .into_iter()
            .map(|frames| audio_sync::presentation_order(frames, &pts.video))
            .collect();

        let map = FrameMap::new(seg.frame_formats.clone());
        let offsets = AudioOffsetTable::new(ledger.audio());
        Ok(Self {
            config,
            ledger,
            pts,
            seg,
            map,
            file_frames,
            offsets,
            outputs: Vec::new(),
            stats: AudioDriftStats::default(),
        })
    }

    /// The tuning constants in use.
    pub fn config(&self) -> &ReformConfig {
        &self.config
    }

    /// The input the engine was built from.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Wraparound-corrected timestamps.
    pub fn modified_pts(&self) -> &ModifiedPts {
        &self.pts
    }

    /// Sections, formats and file layout.
    pub fn segmentation(&self) -> &Segmentation {
        &self.seg
    }

    /// Section table, ordered by start.
    pub fn sections(&self) -> &[SectionBoundary] {
        &self.seg.sections
    }

    /// Every output format, indexed by id.
    pub fn formats(&self) -> &[OutputFormat] {
        &self.seg.formats
    }

    /// Number of output video files.
    pub fn num_output_files(&self) -> usize {
        self.seg.files.len()
    }

    /// Number of distinct encoder configurations in output file `file`.
    pub fn num_encoder_slots(&self, file: usize) -> Result<usize> {
        Ok(self.slots(file)?.len())
    }

    /// Encoder configuration of `slot` in output file `file`.
    pub fn output_format(&self, file: usize, slot: usize) -> Result<&OutputFormat> {
        let format_id = self.slot_format(file, slot)?;
        Ok(&self.seg.formats[format_id])
    }

    /// Output format id of a video frame.
    pub fn frame_format(&self, frame: usize) -> Option<usize> {
        self.map.format_of(frame)
    }

    /// All video frames of `file` in presentation order.
    pub fn file_frames(&self, file: usize) -> Result<&[usize]> {
        self.file_frames
            .get(file)
            .map(Vec::as_slice)
            .ok_or_else(|| self.no_such_file(file))
    }

    /// Video frames one encoder must receive, in presentation order.
    pub fn encoder_frames(&self, file: usize, slot: usize) -> Result<Vec<usize>> {
        let format_id = self.slot_format(file, slot)?;
        Ok(self
            .file_frames(file)?
            .iter()
            .copied()
            .filter(|&v| self.map.format_of(v) == Some(format_id))
            .collect())
    }

    /// Position inside [`file_frames`](Self::file_frames) of the first frame
    /// at or after modified PTS `pts`.
    pub fn frame_position(&self, file: usize, pts: i64) -> Result<usize> {
        let frames = self.file_frames(file)?;
        Ok(frames.partition_point(|&v| self.pts.video[v] < pts))
    }

    /// Records that an encoder finished `frame`. Safe to call from many
    /// threads at once.
    pub fn mark_encoded(&self, frame: usize) -> Result<()> {
        self.map.mark_encoded(frame)
    }

    /// Whether `frame` has been marked encoded.
    pub fn is_encoded(&self, frame: usize) -> bool {
        self.map.is_encoded(frame)
    }

    /// Number of frames marked so far.
    pub fn encoded_count(&self) -> usize {
        self.map.encoded_count()
    }

    /// Clears every encoded flag, for a fresh encode run.
    pub fn reset_encoded(&mut self) {
        self.map.reset_encoded();
    }

    /// Rebuilds every output file's audio against the encoded frames.
    ///
    /// Takes `&mut self`: no worker can still be marking frames while this
    /// runs. Previous results are replaced.
    pub fn reform(&mut self) -> Result<()> {
        let encoded = self.map.encoded_exclusive();
        let (tracks, stats) =
            AudioSynchronizer::new(&self.ledger, &self.pts, &self.seg, &self.config).run(encoded)?;

        let durations: Vec<f64> = tracks.iter().map(|t| t.track.duration).collect();
        let delivery = output::assign_delivery(&durations);
        let outputs: Vec<OutputFile> = tracks
            .into_iter()
            .zip(delivery)
            .map(|(sync, delivery)| OutputFile {
                delivery,
                formats: self.seg.files[sync.file].clone(),
                sync,
            })
            .collect();

        for out in &outputs {
            info!(
                "output file {} (#{}): {} frames, {} encoder slots, duration {}",
                out.file(),
                out.delivery,
                out.track().frames.len(),
                out.formats.len(),
                format_ticks(out.duration())
            );
        }
        self.outputs = outputs;
        self.stats = stats;
        Ok(())
    }

    /// Output files in segmentation order; empty before [`reform`](Self::reform).
    pub fn outputs(&self) -> &[OutputFile] {
        &self.outputs
    }

    /// Output file `file`, once reformed.
    pub fn output(&self, file: usize) -> Option<&OutputFile> {
        self.outputs.get(file)
    }

    /// The output file with delivery ordinal 0.
    pub fn main_output(&self) -> Option<&OutputFile> {
        self.outputs.iter().find(|o| o.is_main())
    }

    /// Audio track of one encoder slot after reformation.
    pub fn slot_track(&self, file: usize, slot: usize) -> Result<&Track> {
        self.slot_format(file, slot)?;
        self.outputs
            .get(file)
            .and_then(|o| o.slot(slot))
            .ok_or_else(|| ReformError::internal("stream has not been reformed yet"))
    }

    /// Byte offsets of every source audio frame.
    pub fn audio_offsets(&self) -> &AudioOffsetTable {
        &self.offsets
    }

    /// Counters of the last [`reform`](Self::reform).
    pub fn drift_stats(&self) -> &AudioDriftStats {
        &self.stats
    }

    /// Drift summary of the last [`reform`](Self::reform), with positions
    /// relative to the first video frame.
    pub fn drift_report(&self) -> DriftReport {
        DriftReport::new(&self.stats, self.pts.video_span().0)
    }

    /// Maps every output file back onto the source timeline.
    pub fn timeline_report(&self) -> TimelineReport {
        let files = self
            .outputs
            .iter()
            .map(|out| {
                let slots = out
                    .formats
                    .iter()
                    .enumerate()
                    .map(|(slot, &format_id)| {
                        let format = &self.seg.formats[format_id];
                        let track = out.slot(slot);
                        SlotSummary {
                            slot,
                            format_id,
                            width: format.video.width,
                            height: format.video.height,
                            frame_rate: format!(
                                "{}/{}",
                                format.video.frame_rate.num, format.video.frame_rate.den
                            ),
                            audio_channels: format.num_channels(),
                            frames: track.map_or(0, |t| t.frames.len()),
                            duration: track.map_or(0.0, |t| t.duration),
                        }
                    })
                    .collect();
                FileSummary {
                    file: out.file(),
                    delivery: out.delivery,
                    source_start: out.sync.source_start,
                    source_end: out.sync.source_end,
                    duration: out.duration(),
                    total_frames: self.file_frames.get(out.file()).map_or(0, Vec::len),
                    encoded_frames: out.track().frames.len(),
                    slots,
                }
            })
            .collect();
        TimelineReport {
            stream_start: self.pts.video_span().0,
            files,
        }
    }

    fn slots(&self, file: usize) -> Result<&[usize]> {
        self.seg
            .files
            .get(file)
            .map(Vec::as_slice)
            .ok_or_else(|| self.no_such_file(file))
    }

    fn slot_format(&self, file: usize, slot: usize) -> Result<usize> {
        let slots = self.slots(file)?;
        slots.get(slot).copied().ok_or_else(|| {
            ReformError::internal(format!(
                "encoder slot {} out of range, file {} has {} slots",
                slot,
                file,
                slots.len()
            ))
        })
    }

    fn no_such_file(&self, file: usize) -> ReformError {
        ReformError::internal(format!(
            "output file {} out of range, stream has {} files",
            file,
            self.seg.files.len()
        ))
    }
}
