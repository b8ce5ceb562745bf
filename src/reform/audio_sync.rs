//! Rebuilds each output file's audio tracks against its encoded video
//! timeline.
//!
//! Video frames are replayed in presentation order. Every frame advances the
//! file clock by its display duration, and each audio channel is then topped
//! up from its source frames until it has caught up with that clock. Source
//! frames are consumed strictly forward per channel; lost frames are covered by
//! repeating the next usable frame, early duplicates are skipped, and frames
//! out of decode order trigger a bounded resynchronization search.

use bitvec::slice::BitSlice;
use log::{debug, info, warn};
use serde::Serialize;

use crate::av::{AudioFormat, AudioFrame};
use crate::config::ReformConfig;
use crate::error::Result;
use crate::utils::format_ticks;

use super::{Ledger, ModifiedPts, Segmentation};

/// Running totals over one reformation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AudioDriftStats {
    /// Audio frames in the source
    pub source_frames: u64,
    /// Audio frames written to output tracks, repeats included
    pub emitted_frames: u64,
    /// Distinct source frames written
    pub unique_frames: u64,
    /// Source frames passed over as duplicates, stale or out of order
    pub skipped_frames: u64,
    /// Resynchronization jumps
    pub resyncs: u64,
    /// Sum of placement errors, in ticks
    pub sum_pts_diff: f64,
    /// Largest placement error, in ticks
    pub max_pts_diff: f64,
    /// Source PTS of the frame with the largest placement error
    pub max_pts_diff_at: i64,
    /// Owed audio time no source frame could cover
    pub unfilled_ticks: f64,
}

impl AudioDriftStats {
    fn record(&mut self, diff: f64, at: i64, unique: bool) {
        self.emitted_frames += 1;
        if unique {
            self.unique_frames += 1;
        }
        self.sum_pts_diff += diff;
        if diff > self.max_pts_diff {
            self.max_pts_diff = diff;
            self.max_pts_diff_at = at;
        }
    }

    /// Mean placement error per emitted frame.
    pub fn avg_pts_diff(&self) -> f64 {
        if self.emitted_frames == 0 {
            return 0.0;
        }
        self.sum_pts_diff / self.emitted_frames as f64
    }

    /// Frames written more than once to cover lost audio.
    pub fn repeated_frames(&self) -> u64 {
        self.emitted_frames - self.unique_frames
    }
}

/// Video frames and audio of one output file, or of one encoder slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Track {
    /// Encoded video frames in presentation order
    pub frames: Vec<usize>,
    /// Local start time of every frame, in ticks
    pub timecodes: Vec<f64>,
    /// Per channel, source audio frame indices in output order
    pub audio: Vec<Vec<usize>>,
    /// Sum of frame durations, in ticks
    pub duration: f64,
}

impl Track {
    fn with_channels(channels: usize) -> Self {
        Self {
            audio: vec![Vec::new(); channels],
            ..Default::default()
        }
    }

    fn push_frame(&mut self, frame: usize, duration: f64) {
        self.frames.push(frame);
        self.timecodes.push(self.duration);
        self.duration += duration;
    }
}

/// Synchronization result for one output file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileTrack {
    /// Output file id
    pub file: usize,
    /// The whole file across all encoder slots
    pub track: Track,
    /// One track per encoder slot, in slot order
    pub slots: Vec<Track>,
    /// Source timeline span covered by the encoded frames
    pub source_start: f64,
    /// End of the covered span
    pub source_end: f64,
}

/// Start and display duration of each frame, in the order given.
///
/// Fixed-rate frames last a nominal period scaled by their picture structure,
/// with bottom-field-first pictures pulled back half a period. Variable-rate
/// frames last until the next frame in the list; the last one has no
/// duration.
pub fn frame_timing(ledger: &Ledger, video_pts: &[i64], frames: &[usize]) -> Vec<(f64, f64)> {
    frames
        .iter()
        .enumerate()
        .map(|(k, &v)| {
            let frame = &ledger.video()[v];
            let pts = video_pts[v] as f64;
            if frame.format.fixed_rate {
                let period = frame.format.frame_rate.period_ticks();
                let shift = if frame.pic.is_bottom_first() {
                    period / 2.0
                } else {
                    0.0
                };
                (pts - shift, period * frame.pic.duration_factor())
            } else {
                let duration = frames
                    .get(k + 1)
                    .map_or(0.0, |&next| (video_pts[next] - video_pts[v]) as f64);
                (pts, duration)
            }
        })
        .collect()
}

/// Orders video frames by modified PTS, ties by decode order.
pub fn presentation_order(mut frames: Vec<usize>, video_pts: &[i64]) -> Vec<usize> {
    frames.sort_by_key(|&v| (video_pts[v], v));
    frames
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillStop {
    Filled,
    /// The next candidate belongs to a later video frame
    Deferred,
    Exhausted,
}

/// Fill state of one channel within one output file.
#[derive(Debug, Clone, Default)]
struct ChannelCursor {
    /// File-local audio time written so far
    emitted: f64,
    /// Position in the channel's frame list of the last consumed frame
    last: Option<usize>,
    /// Fill position of the last logged repair
    last_repair: Option<f64>,
    frame_duration: f64,
    started: bool,
}

impl ChannelCursor {
    fn next(&self) -> usize {
        self.last.map_or(0, |p| p + 1)
    }
}

/// Fill request for one channel and one video frame.
struct Window {
    pos: f64,
    target_end: f64,
    file_time: f64,
    want: AudioFormat,
}

/// Audio source frames indexed per channel.
struct Sources<'a> {
    audio: &'a [AudioFrame],
    audio_pts: &'a [i64],
    /// Per channel, global frame indices in decode order
    channels: Vec<Vec<usize>>,
    /// Per channel, positions into `channels` sorted by PTS
    by_pts: Vec<Vec<usize>>,
    early: f64,
    late: f64,
    gap: f64,
    resync: f64,
    scan_limit: usize,
}

impl<'a> Sources<'a> {
    fn new(ledger: &'a Ledger, pts: &'a ModifiedPts, config: &ReformConfig) -> Self {
        let audio_pts = &pts.audio;
        let channels: Vec<Vec<usize>> = (0..ledger.num_channels())
            .map(|ch| ledger.channel_frames(ch))
            .collect();
        let by_pts = channels
            .iter()
            .map(|chan| {
                let mut order: Vec<usize> = (0..chan.len()).collect();
                order.sort_by_key(|&p| (audio_pts[chan[p]], p));
                order
            })
            .collect();
        Self {
            audio: ledger.audio(),
            audio_pts,
            channels,
            by_pts,
            early: config.early_accept_ratio,
            late: config.late_accept_ratio,
            gap: config.gap_tolerance_ratio,
            resync: config.resync_tolerance_ratio,
            scan_limit: config.resync_scan_limit,
        }
    }

    fn frames(&self, ch: usize) -> &[usize] {
        self.channels.get(ch).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Consumes frames forward from the cursor until the channel has caught
    /// up with `win.file_time`.
    fn fill(
        &self,
        ch: usize,
        cur: &mut ChannelCursor,
        win: &mut Window,
        out: &mut Vec<usize>,
        stats: &mut AudioDriftStats,
    ) -> FillStop {
        let chan = self.frames(ch);
        let mut next = cur.next();
        let mut skipped = 0u64;

        let stop = loop {
            if cur.emitted >= win.file_time {
                break FillStop::Filled;
            }
            let Some(&g) = chan.get(next) else {
                break FillStop::Exhausted;
            };
            let frame = &self.audio[g];
            let fd = frame.duration_ticks();
            let fpts = self.audio_pts[g] as f64;

            if fpts >= win.target_end - fd * (1.0 - self.late) {
                break FillStop::Deferred;
            }
            let early = fpts < win.pos - fd * self.early;
            if frame.format != win.want && !early {
                // First frame of the next audio format: the section ends here
                break FillStop::Deferred;
            }
            cur.last = Some(next);
            next += 1;
            if frame.format != win.want || early {
                skipped += 1;
                continue;
            }

            let gap = fpts - win.pos;
            if gap >= fd * (1.0 - self.gap) {
                let repeats = (gap / fd).round().max(1.0) as usize;
                if cur.last_repair != Some(win.pos) {
                    warn!(
                        "channel {}: {} of audio missing at {}, repeating frame {} {} times",
                        ch,
                        format_ticks(gap),
                        format_ticks(win.pos),
                        g,
                        repeats
                    );
                    cur.last_repair = Some(win.pos);
                }
                for _ in 0..repeats {
                    place(cur, win, out, stats, g, fpts, fd, false);
                }
            }
            place(cur, win, out, stats, g, fpts, fd, true);
        };

        if skipped > 0 {
            warn!(
                "channel {}: skipped {} audio frames before {}",
                ch,
                skipped,
                format_ticks(win.pos)
            );
            stats.skipped_frames += skipped;
        }
        stop
    }

    /// First frame at or after `threshold` in PTS order whose position is
    /// at least `from` and whose format is `want`. Examines at most
    /// `resync_scan_limit` candidates.
    fn seek(&self, ch: usize, threshold: f64, from: usize, want: AudioFormat) -> Option<usize> {
        let chan = self.frames(ch);
        let order = self.by_pts.get(ch)?;
        let first = order.partition_point(|&p| (self.audio_pts[chan[p]] as f64) < threshold);
        order[first..]
            .iter()
            .take(self.scan_limit)
            .copied()
            .find(|&p| p >= from && self.audio[chan[p]].format == want)
    }

    /// Places the cursor of a channel entering a file just before the first
    /// frame usable at `pos`.
    fn start(&self, ch: usize, cur: &mut ChannelCursor, pos: f64, want: AudioFormat) {
        let slack = self
            .frames(ch)
            .first()
            .map_or(0.0, |&g| self.audio[g].duration_ticks())
            * self.early;
        match self.seek(ch, pos - slack, 0, want) {
            Some(p) => {
                if p > 0 {
                    debug!("channel {}: starts at source frame {}", ch, self.frames(ch)[p]);
                }
                cur.last = p.checked_sub(1);
            }
            None => {
                // Nothing usable nearby; frames timed before `pos` belong to
                // earlier files
                let chan = self.frames(ch);
                let Some(order) = self.by_pts.get(ch) else {
                    return;
                };
                let before = order.partition_point(|&p| (self.audio_pts[chan[p]] as f64) < pos);
                cur.last = before.checked_sub(1).map(|i| order[i]);
            }
        }
    }

    /// Looks for the first unconsumed frame not materially earlier than the
    /// fill position and moves the cursor just before it. Returns false when
    /// the cursor already points at it or nothing usable is left.
    fn resync(
        &self,
        ch: usize,
        cur: &mut ChannelCursor,
        win: &Window,
        stats: &mut AudioDriftStats,
    ) -> bool {
        let next = cur.next();
        let threshold = win.pos - cur.frame_duration * self.resync;
        match self.seek(ch, threshold, next, win.want) {
            Some(p) if p != next => {
                warn!(
                    "channel {}: audio resynchronized at {}, jumping over {} frames",
                    ch,
                    format_ticks(win.pos),
                    p - next
                );
                stats.resyncs += 1;
                stats.skipped_frames += (p - next) as u64;
                cur.last = Some(p - 1);
                true
            }
            _ => false,
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn place(
    cur: &mut ChannelCursor,
    win: &mut Window,
    out: &mut Vec<usize>,
    stats: &mut AudioDriftStats,
    frame: usize,
    fpts: f64,
    fd: f64,
    unique: bool,
) {
    stats.record((fpts - win.pos).abs(), fpts as i64, unique);
    out.push(frame);
    win.pos += fd;
    cur.emitted += fd;
    cur.frame_duration = fd;
}

/// Runs the synchronization pass over every output file.
pub struct AudioSynchronizer<'a> {
    ledger: &'a Ledger,
    pts: &'a ModifiedPts,
    seg: &'a Segmentation,
    sources: Sources<'a>,
    stats: AudioDriftStats,
}

impl<'a> AudioSynchronizer<'a> {
    /// Prepares a pass over `ledger` as segmented in `seg`.
    pub fn new(
        ledger: &'a Ledger,
        pts: &'a ModifiedPts,
        seg: &'a Segmentation,
        config: &ReformConfig,
    ) -> Self {
        let stats = AudioDriftStats {
            source_frames: ledger.audio().len() as u64,
            ..Default::default()
        };
        Self {
            ledger,
            pts,
            seg,
            sources: Sources::new(ledger, pts, config),
            stats,
        }
    }

    /// Synchronizes all files. Only frames flagged in `encoded` take part.
    pub fn run(mut self, encoded: &BitSlice) -> Result<(Vec<FileTrack>, AudioDriftStats)> {
        let mut per_file: Vec<Vec<usize>> = vec![Vec::new(); self.seg.files.len()];
        for (v, &format_id) in self.seg.frame_formats.iter().enumerate() {
            if encoded.get(v).map_or(false, |bit| *bit) {
                per_file[self.seg.formats[format_id].video_file].push(v);
            }
        }

        let mut tracks = Vec::with_capacity(per_file.len());
        for (file, frames) in per_file.into_iter().enumerate() {
            let frames = presentation_order(frames, &self.pts.video);
            tracks.push(self.sync_file(file, &frames)?);
        }

        let stats = self.stats;
        info!(
            "audio: {}/{} source frames used, {} emitted, {} repeated, {} skipped, {} resyncs, \
             drift avg {:.1} max {:.1} ticks",
            stats.unique_frames,
            stats.source_frames,
            stats.emitted_frames,
            stats.repeated_frames(),
            stats.skipped_frames,
            stats.resyncs,
            stats.avg_pts_diff(),
            stats.max_pts_diff
        );
        Ok((tracks, stats))
    }

    fn sync_file(&mut self, file: usize, frames: &[usize]) -> Result<FileTrack> {
        let slot_formats = &self.seg.files[file];
        let file_channels = slot_formats
            .iter()
            .map(|&id| self.seg.formats[id].num_channels())
            .max()
            .unwrap_or(0);

        let mut track = Track::with_channels(file_channels);
        let mut slots: Vec<Track> = slot_formats
            .iter()
            .map(|&id| Track::with_channels(self.seg.formats[id].num_channels()))
            .collect();
        let mut cursors = vec![ChannelCursor::default(); file_channels];

        let timing = frame_timing(self.ledger, &self.pts.video, frames);
        for (&v, &(start, duration)) in frames.iter().zip(&timing) {
            let format = &self.seg.formats[self.seg.frame_formats[v]];
            let slot = self.seg.slot_of(format.id)?;
            let file_start = track.duration;
            track.push_frame(v, duration);
            slots[slot].push_frame(v, duration);
            let file_time = track.duration;
            let target_end = start + duration;

            for (ch, &want) in format.audio.iter().enumerate() {
                let cur = &mut cursors[ch];
                let entering = !cur.started;
                if entering {
                    cur.started = true;
                    if file_start > 0.0 {
                        // Channel appears mid-file; its track begins here
                        warn!(
                            "file {} channel {}: no audio before {}",
                            file,
                            ch,
                            format_ticks(file_start)
                        );
                        cur.emitted = file_start;
                        self.stats.unfilled_ticks += file_start;
                    }
                }
                let owed = file_time - cur.emitted;
                if owed <= 0.0 {
                    continue;
                }
                let mut win = Window {
                    pos: target_end - owed,
                    target_end,
                    file_time,
                    want,
                };
                if entering {
                    self.sources.start(ch, cur, win.pos, want);
                }
                let out = &mut track.audio[ch];
                let before = out.len();
                let stop = self.sources.fill(ch, cur, &mut win, out, &mut self.stats);
                if stop != FillStop::Filled
                    && self.sources.resync(ch, cur, &win, &mut self.stats)
                {
                    self.sources.fill(ch, cur, &mut win, out, &mut self.stats);
                }
                slots[slot].audio[ch].extend_from_slice(&out[before..]);
            }
        }

        for (ch, cur) in cursors.iter().enumerate().filter(|(_, c)| c.started) {
            let shortfall = track.duration - cur.emitted;
            if shortfall > 0.0 {
                self.stats.unfilled_ticks += shortfall;
                if cur.frame_duration == 0.0 || shortfall >= cur.frame_duration {
                    warn!(
                        "file {} channel {}: {} of audio left unfilled",
                        file,
                        ch,
                        format_ticks(shortfall)
                    );
                }
            }
        }

        let (source_start, source_end) = match (timing.first(), timing.last()) {
            (Some(&(first, _)), Some(&(last, duration))) => (first, last + duration),
            _ => (0.0, 0.0),
        };
        debug!(
            "file {}: {} frames, {} encoder slots, duration {}",
            file,
            track.frames.len(),
            slots.len(),
            format_ticks(track.duration)
        );
        Ok(FileTrack {
            file,
            track,
            slots,
            source_start,
            source_end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::{
        ChannelLayout, CodecType, FormatChange, FrameRate, PicStruct, VideoFormat, VideoFrame,
    };
    use crate::reform::segment::segment;
    use bitvec::prelude::*;
    use pretty_assertions::assert_eq;

    const PERIOD: i64 = 3003;
    const AUDIO_PERIOD: i64 = 1920;

    fn hd() -> VideoFormat {
        VideoFormat::new(CodecType::MPEG2, 1440, 1080, FrameRate::ntsc())
    }

    fn stereo() -> AudioFormat {
        AudioFormat::new(CodecType::AAC, 48000, ChannelLayout::Stereo)
    }

    fn opening() -> Vec<FormatChange> {
        vec![
            FormatChange::ChannelCountChanged {
                video_frame: 0,
                channels: 1,
            },
            FormatChange::VideoFormatChanged { video_frame: 0 },
            FormatChange::AudioFormatChanged {
                audio_frame: 0,
                channel: 0,
            },
        ]
    }

    /// 640 video frames and the given audio PTS list on channel 0.
    fn run_with(audio_pts: &[i64], encoded: usize) -> (Vec<FileTrack>, AudioDriftStats) {
        let video = (0..640)
            .map(|i| VideoFrame::new(i * PERIOD, hd()))
            .collect();
        let audio = audio_pts
            .iter()
            .map(|&p| AudioFrame::new(p, 1024, stereo()))
            .collect();
        let ledger = Ledger::new(video, audio, opening()).unwrap();
        let config = ReformConfig::default();
        let pts = ModifiedPts::from_ledger(&ledger, config.max_pts_regression_ticks()).unwrap();
        let seg = segment(&ledger, &pts, &config).unwrap();
        let mut flags = bitvec![0; 640];
        flags[..encoded].fill(true);
        AudioSynchronizer::new(&ledger, &pts, &seg, &config)
            .run(&flags)
            .unwrap()
    }

    fn on_schedule(n: i64) -> Vec<i64> {
        (0..n).map(|i| i * AUDIO_PERIOD).collect()
    }

    #[test]
    fn test_perfect_input_emits_every_frame_once() {
        let (tracks, stats) = run_with(&on_schedule(1001), 640);
        assert_eq!(tracks.len(), 1);
        let track = &tracks[0].track;
        assert_eq!(track.audio[0], (0..1001).collect::<Vec<_>>());
        assert_eq!(track.duration, (640 * PERIOD) as f64);
        assert_eq!(stats.emitted_frames, 1001);
        assert_eq!(stats.unique_frames, 1001);
        assert_eq!(stats.skipped_frames, 0);
        assert_eq!(stats.resyncs, 0);
        assert_eq!(stats.max_pts_diff, 0.0);
        assert_eq!(stats.unfilled_ticks, 0.0);
        assert_eq!(tracks[0].slots[0], *track);
    }

    #[test]
    fn test_lost_frame_is_repeat_filled() {
        let mut pts = on_schedule(1001);
        pts.remove(500);
        let (tracks, stats) = run_with(&pts, 640);
        let list = &tracks[0].track.audio[0];
        assert_eq!(list.len(), 1001);
        // Frame 500 of the source list is what was frame 501 on schedule
        assert_eq!(&list[499..502], &[499, 500, 500]);
        assert_eq!(stats.unique_frames, 1000);
        assert_eq!(stats.repeated_frames(), 1);
        assert_eq!(stats.max_pts_diff, AUDIO_PERIOD as f64);
        assert_eq!(stats.max_pts_diff_at, 501 * AUDIO_PERIOD);
    }

    #[test]
    fn test_duplicate_frame_is_skipped() {
        let mut pts = on_schedule(1001);
        pts.insert(301, 300 * AUDIO_PERIOD);
        let (tracks, stats) = run_with(&pts, 640);
        let list = &tracks[0].track.audio[0];
        assert_eq!(list.len(), 1001);
        assert!(!list.contains(&301));
        assert_eq!(stats.source_frames, 1002);
        assert_eq!(stats.skipped_frames, 1);
        assert_eq!(stats.max_pts_diff, 0.0);
    }

    #[test]
    fn test_out_of_order_burst_triggers_resync() {
        let mut pts = on_schedule(100);
        pts.extend((0..10).map(|k| 1_500_000 + k * AUDIO_PERIOD));
        pts.extend((100..1001).map(|i| i * AUDIO_PERIOD));
        let (tracks, stats) = run_with(&pts, 640);
        let list = &tracks[0].track.audio[0];
        assert_eq!(stats.resyncs, 1);
        assert_eq!(stats.skipped_frames, 10);
        assert_eq!(list.len(), 1001);
        assert!(list.iter().all(|&g| !(100..110).contains(&g)));
        assert_eq!(stats.max_pts_diff, 0.0);
    }

    #[test]
    fn test_unencoded_frames_are_excluded() {
        let (tracks, stats) = run_with(&on_schedule(1001), 320);
        let track = &tracks[0].track;
        assert_eq!(track.frames.len(), 320);
        assert_eq!(track.duration, (320 * PERIOD) as f64);
        // 320 frames hold 500.5 audio frames
        assert_eq!(stats.emitted_frames, 501);
    }

    #[test]
    fn test_rerun_is_identical() {
        let mut pts = on_schedule(1001);
        pts.remove(700);
        pts.insert(200, 199 * AUDIO_PERIOD);
        let first = run_with(&pts, 640);
        let second = run_with(&pts, 640);
        assert_eq!(first, second);
    }

    #[test]
    fn test_telecine_timing_is_contiguous() {
        let pics = [
            PicStruct::Tff,
            PicStruct::TffRff,
            PicStruct::Bff,
            PicStruct::BffRff,
        ];
        // 24p soft telecine: four pictures every five frame periods
        let raw = [0, PERIOD, 2 * PERIOD + PERIOD / 2, 3 * PERIOD + PERIOD / 2];
        let video = pics
            .iter()
            .zip(raw)
            .map(|(&pic, pts)| VideoFrame::new(pts, hd()).with_pic(pic))
            .collect();
        let audio = vec![AudioFrame::new(0, 1024, stereo())];
        let ledger = Ledger::new(video, audio, opening()).unwrap();
        let pts = ModifiedPts::from_ledger(&ledger, 5_400_000).unwrap();
        let timing = frame_timing(&ledger, &pts.video, &[0, 1, 2, 3]);
        let mut end = 0.0;
        for (start, duration) in timing {
            assert!((start - end).abs() <= 0.5);
            end = start + duration;
        }
        assert!((end - (5 * PERIOD) as f64).abs() <= 0.5);
    }

    #[test]
    fn test_variable_rate_durations_follow_gaps() {
        let vfr = hd().with_fixed_rate(false);
        let video = [0, 3003, 9009]
            .iter()
            .map(|&p| VideoFrame::new(p, vfr))
            .collect();
        let audio = vec![AudioFrame::new(0, 1024, stereo())];
        let ledger = Ledger::new(video, audio, opening()).unwrap();
        let pts = ModifiedPts::from_ledger(&ledger, 5_400_000).unwrap();
        let timing = frame_timing(&ledger, &pts.video, &[0, 1, 2]);
        assert_eq!(timing, vec![(0.0, 3003.0), (3003.0, 6006.0), (9009.0, 0.0)]);
    }

    #[test]
    fn test_doubled_and_tripled_frames_last_longer() {
        let pics = [
            PicStruct::Frame,
            PicStruct::FrameDoubling,
            PicStruct::FrameTripling,
        ];
        let video = pics
            .iter()
            .zip([0, PERIOD, 3 * PERIOD])
            .map(|(&pic, pts)| VideoFrame::new(pts, hd()).with_pic(pic))
            .collect();
        let audio = vec![AudioFrame::new(0, 1024, stereo())];
        let ledger = Ledger::new(video, audio, opening()).unwrap();
        let pts = ModifiedPts::from_ledger(&ledger, 5_400_000).unwrap();
        let timing = frame_timing(&ledger, &pts.video, &[0, 1, 2]);
        assert_eq!(
            timing,
            vec![(0.0, 3003.0), (3003.0, 6006.0), (9009.0, 9009.0)]
        );
    }

    #[test]
    fn test_audio_format_change_within_file_is_seamless() {
        let mono = AudioFormat::new(CodecType::AAC, 48000, ChannelLayout::Mono);
        let video = (0..600)
            .map(|i| VideoFrame::new(i * PERIOD, hd()))
            .collect();
        let audio = (0..940)
            .map(|i| {
                let format = if i < 300 { stereo() } else { mono };
                AudioFrame::new(i * AUDIO_PERIOD, 1024, format)
            })
            .collect();
        let mut events = opening();
        events.push(FormatChange::AudioFormatChanged {
            audio_frame: 300,
            channel: 0,
        });
        let ledger = Ledger::new(video, audio, events).unwrap();
        let config = ReformConfig::default();
        let pts = ModifiedPts::from_ledger(&ledger, config.max_pts_regression_ticks()).unwrap();
        let seg = segment(&ledger, &pts, &config).unwrap();
        assert_eq!(seg.files[0].len(), 2);

        let flags = bitvec![1; 600];
        let (tracks, stats) = AudioSynchronizer::new(&ledger, &pts, &seg, &config)
            .run(&flags)
            .unwrap();
        let file = &tracks[0];
        // 600 frames hold 938.4 audio frames
        assert_eq!(file.track.audio[0], (0..939).collect::<Vec<_>>());
        assert_eq!(file.slots[0].audio[0], (0..300).collect::<Vec<_>>());
        assert_eq!(file.slots[1].audio[0], (300..939).collect::<Vec<_>>());
        assert_eq!(stats.skipped_frames, 0);
        assert_eq!(stats.repeated_frames(), 0);
        assert_eq!(stats.resyncs, 0);
        assert_eq!(stats.max_pts_diff, 0.0);
    }

    #[test]
    fn test_channel_start_without_match_keeps_earlier_frames_consumed() {
        let mono = AudioFormat::new(CodecType::AAC, 48000, ChannelLayout::Mono);
        let video = (0..64)
            .map(|i| VideoFrame::new(i * PERIOD, hd()))
            .collect();
        let audio = on_schedule(100)
            .into_iter()
            .map(|p| AudioFrame::new(p, 1024, stereo()))
            .collect();
        let ledger = Ledger::new(video, audio, opening()).unwrap();
        let config = ReformConfig::default();
        let pts = ModifiedPts::from_ledger(&ledger, config.max_pts_regression_ticks()).unwrap();
        let sources = Sources::new(&ledger, &pts, &config);

        let mut cur = ChannelCursor::default();
        sources.start(0, &mut cur, (50 * AUDIO_PERIOD) as f64, mono);
        assert_eq!(cur.last, Some(49));

        let mut cur = ChannelCursor::default();
        sources.start(0, &mut cur, (50 * AUDIO_PERIOD) as f64, stereo());
        assert_eq!(cur.last, Some(49));

        let mut cur = ChannelCursor::default();
        sources.start(0, &mut cur, 0.0, mono);
        assert_eq!(cur.last, None);
    }
}
