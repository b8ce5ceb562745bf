//! Binary debug snapshot of a stream ledger.
//!
//! Layout, all integers big-endian:
//!
//! | field | size |
//! |---|---|
//! | magic `TSRF` | 4 |
//! | output video file count | 4 |
//! | video frame count, then 28-byte records | 4 + 28n |
//! | audio frame count, then 34-byte records | 4 + 34n |
//! | event count, then 13-byte records | 4 + 13n |
//! | CRC-32/MPEG-2 of everything above | 4 |
//!
//! The layout is internal and carries no version.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{LedgerSink, LedgerSource};
use crate::av::{
    AudioFormat, AudioFrame, ChannelLayout, CodecType, FormatChange, FrameRate, PicStruct,
    VideoFormat, VideoFrame,
};
use crate::config::ReformConfig;
use crate::error::{ReformError, Result};
use crate::reform::{Ledger, StreamReformer};
use crate::utils::Crc32Mpeg2;

const MAGIC: &[u8; 4] = b"TSRF";
const VIDEO_RECORD: usize = 28;
const AUDIO_RECORD: usize = 34;
const EVENT_RECORD: usize = 13;

/// Serializes `ledger` together with the number of output files it
/// segments into.
pub fn encode_snapshot(video_files: usize, ledger: &Ledger) -> Bytes {
    let size = 4 + 4
        + 4 + ledger.video().len() * VIDEO_RECORD
        + 4 + ledger.audio().len() * AUDIO_RECORD
        + 4 + ledger.events().len() * EVENT_RECORD
        + 4;
    let mut buf = BytesMut::with_capacity(size);

    buf.put_slice(MAGIC);
    buf.put_u32(video_files as u32);

    buf.put_u32(ledger.video().len() as u32);
    for frame in ledger.video() {
        buf.put_i64(frame.pts);
        buf.put_u8(frame.pic.tag());
        buf.put_u8(frame.format.codec.tag());
        buf.put_u32(frame.format.width);
        buf.put_u32(frame.format.height);
        buf.put_u32(frame.format.frame_rate.num);
        buf.put_u32(frame.format.frame_rate.den);
        buf.put_u8(frame.format.progressive as u8);
        buf.put_u8(frame.format.fixed_rate as u8);
    }

    buf.put_u32(ledger.audio().len() as u32);
    for frame in ledger.audio() {
        buf.put_i64(frame.pts);
        buf.put_u32(frame.samples);
        buf.put_u8(frame.format.codec.tag());
        buf.put_u32(frame.format.sample_rate);
        buf.put_u8(frame.format.layout.tag());
        buf.put_u32(frame.channel as u32);
        buf.put_u64(frame.file_offset);
        buf.put_u32(frame.coded_size);
    }

    buf.put_u32(ledger.events().len() as u32);
    for ev in ledger.events() {
        let (index, extra) = match *ev {
            FormatChange::ChannelCountChanged {
                video_frame,
                channels,
            } => (video_frame, channels),
            FormatChange::VideoFormatChanged { video_frame } => (video_frame, 0),
            FormatChange::AudioFormatChanged {
                audio_frame,
                channel,
            } => (audio_frame, channel),
        };
        buf.put_u8(ev.tag());
        buf.put_u64(index as u64);
        buf.put_u32(extra as u32);
    }

    let crc = Crc32Mpeg2::checksum(&buf);
    buf.put_u32(crc);
    buf.freeze()
}

/// Parses a snapshot back into the output file count and the ledger.
///
/// # Errors
///
/// `ReformError::InvalidData` for truncated or corrupted data, and the
/// ledger's own `ReformError::Format` checks.
pub fn decode_snapshot(data: &[u8]) -> Result<(usize, Ledger)> {
    if data.len() < MAGIC.len() + 4 * 5 {
        return Err(invalid(format!("snapshot too short: {} bytes", data.len())));
    }
    let (body, trailer) = data.split_at(data.len() - 4);
    let stored = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let computed = Crc32Mpeg2::checksum(body);
    if stored != computed {
        return Err(invalid(format!(
            "snapshot checksum mismatch: stored {:#010x}, computed {:#010x}",
            stored, computed
        )));
    }

    let mut buf = body;
    if &buf[..4] != MAGIC {
        return Err(invalid("not a snapshot: bad magic"));
    }
    buf.advance(4);
    let video_files = buf.get_u32() as usize;

    let count = array_len(&mut buf, VIDEO_RECORD, "video")?;
    let mut video = Vec::with_capacity(count);
    for _ in 0..count {
        let pts = buf.get_i64();
        let pic = PicStruct::try_from(buf.get_u8())?;
        let codec = CodecType::try_from(buf.get_u8())?;
        let width = buf.get_u32();
        let height = buf.get_u32();
        let frame_rate = FrameRate::new(buf.get_u32(), buf.get_u32());
        let format = VideoFormat::new(codec, width, height, frame_rate)
            .with_progressive(buf.get_u8() != 0)
            .with_fixed_rate(buf.get_u8() != 0);
        video.push(VideoFrame::new(pts, format).with_pic(pic));
    }

    let count = array_len(&mut buf, AUDIO_RECORD, "audio")?;
    let mut audio = Vec::with_capacity(count);
    for _ in 0..count {
        let pts = buf.get_i64();
        let samples = buf.get_u32();
        let codec = CodecType::try_from(buf.get_u8())?;
        let sample_rate = buf.get_u32();
        let layout = ChannelLayout::try_from(buf.get_u8())?;
        let channel = buf.get_u32() as usize;
        let offset = buf.get_u64();
        let size = buf.get_u32();
        audio.push(
            AudioFrame::new(pts, samples, AudioFormat::new(codec, sample_rate, layout))
                .with_channel(channel)
                .with_source(offset, size),
        );
    }

    let count = array_len(&mut buf, EVENT_RECORD, "event")?;
    let mut events = Vec::with_capacity(count);
    for _ in 0..count {
        let tag = buf.get_u8();
        let index = buf.get_u64() as usize;
        let extra = buf.get_u32() as usize;
        events.push(match tag {
            0 => FormatChange::ChannelCountChanged {
                video_frame: index,
                channels: extra,
            },
            1 => FormatChange::VideoFormatChanged { video_frame: index },
            2 => FormatChange::AudioFormatChanged {
                audio_frame: index,
                channel: extra,
            },
            _ => return Err(invalid(format!("unknown event tag {}", tag))),
        });
    }

    if buf.has_remaining() {
        return Err(invalid(format!(
            "{} trailing bytes after event array",
            buf.remaining()
        )));
    }

    Ok((video_files, Ledger::new(video, audio, events)?))
}

/// Reads an array length and checks that its records are all present.
fn array_len(buf: &mut &[u8], record: usize, what: &str) -> Result<usize> {
    if buf.remaining() < 4 {
        return Err(invalid(format!("snapshot truncated before {} array", what)));
    }
    let count = buf.get_u32() as usize;
    let needed = count
        .checked_mul(record)
        .ok_or_else(|| invalid(format!("{} array length {} overflows", what, count)))?;
    if buf.remaining() < needed {
        return Err(invalid(format!(
            "{} array truncated: {} records need {} bytes, {} left",
            what,
            count,
            needed,
            buf.remaining()
        )));
    }
    Ok(count)
}

fn invalid(msg: impl Into<String>) -> ReformError {
    ReformError::InvalidData(msg.into())
}

/// Writes snapshots to an async byte sink.
pub struct SnapshotWriter<W: AsyncWrite + Unpin + Send> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> SnapshotWriter<W> {
    /// Wraps an async sink.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the underlying sink.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send> LedgerSink for SnapshotWriter<W> {
    async fn write_reformer(&mut self, reformer: &StreamReformer) -> Result<()> {
        let data = encode_snapshot(reformer.num_output_files(), reformer.ledger());
        debug!("writing {} byte snapshot", data.len());
        self.writer.write_all(&data).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Reads snapshots from an async byte source.
pub struct SnapshotReader<R: AsyncRead + Unpin + Send> {
    reader: R,
    video_files: Option<usize>,
}

impl<R: AsyncRead + Unpin + Send> SnapshotReader<R> {
    /// Wraps an async source.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            video_files: None,
        }
    }

    /// Output file count stored in the last snapshot read.
    pub fn video_files(&self) -> Option<usize> {
        self.video_files
    }

    /// Reads a snapshot and rebuilds the engine from it.
    ///
    /// # Errors
    ///
    /// Besides decoding errors, `ReformError::InvalidData` when the rebuilt
    /// engine does not segment into the recorded number of output files.
    pub async fn read_reformer(&mut self, config: ReformConfig) -> Result<StreamReformer> {
        let ledger = self.read_ledger().await?;
        let reformer = StreamReformer::new(ledger, config)?;
        let expected = self.video_files.unwrap_or(0);
        if reformer.num_output_files() != expected {
            return Err(invalid(format!(
                "snapshot records {} output files but the stream segments into {}",
                expected,
                reformer.num_output_files()
            )));
        }
        Ok(reformer)
    }
}

#[async_trait::async_trait]
impl<R: AsyncRead + Unpin + Send> LedgerSource for SnapshotReader<R> {
    async fn read_ledger(&mut self) -> Result<Ledger> {
        let mut data = Vec::new();
        self.reader.read_to_end(&mut data).await?;
        let (video_files, ledger) = decode_snapshot(&data)?;
        debug!(
            "read snapshot: {} video, {} audio frames, {} events",
            ledger.video().len(),
            ledger.audio().len(),
            ledger.events().len()
        );
        self.video_files = Some(video_files);
        Ok(ledger)
    }
}
