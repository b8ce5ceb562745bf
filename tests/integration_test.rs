#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use pretty_assertions::assert_eq;
    use tokio::fs::File;
    use tsreform::av::{
        AudioFormat, AudioFrame, ChannelLayout, CodecType, FormatChange, FrameRate, PicStruct,
        VideoFormat, VideoFrame,
    };
    use tsreform::config::{create_default_config_template, ReformConfig};
    use tsreform::format::{LedgerSink, SnapshotReader, SnapshotWriter};
    use tsreform::{Ledger, ReformError, StreamReformer};

    const PERIOD: i64 = 3003;
    const WRAP: i64 = 1 << 33;

    /// A capture starting 20 seconds before the PTS clock wraps, with a
    /// switch from 1080i to 480i after 900 frames and two audio streams.
    fn capture() -> Ledger {
        let hd = VideoFormat::new(CodecType::MPEG2, 1440, 1080, FrameRate::ntsc());
        let sd = VideoFormat::new(CodecType::MPEG2, 720, 480, FrameRate::ntsc());
        let start = WRAP - 20 * 90_000;
        let video = (0..1500)
            .map(|i| {
                let format = if i < 900 { hd } else { sd };
                VideoFrame::new((start + i * PERIOD) % WRAP, format).with_pic(PicStruct::Tff)
            })
            .collect();

        let aac = AudioFormat::new(CodecType::AAC, 48000, ChannelLayout::Stereo);
        let mut audio = Vec::new();
        for i in 0..2347i64 {
            for ch in 0..2 {
                let offset = audio.len() as u64 * 384;
                audio.push(
                    AudioFrame::new((start + i * 1920) % WRAP, 1024, aac)
                        .with_channel(ch)
                        .with_source(offset, 384),
                );
            }
        }

        let events = vec![
            FormatChange::ChannelCountChanged {
                video_frame: 0,
                channels: 2,
            },
            FormatChange::VideoFormatChanged { video_frame: 0 },
            FormatChange::AudioFormatChanged {
                audio_frame: 0,
                channel: 0,
            },
            FormatChange::AudioFormatChanged {
                audio_frame: 1,
                channel: 1,
            },
            FormatChange::VideoFormatChanged { video_frame: 900 },
        ];
        Ledger::new(video, audio, events).unwrap()
    }

    fn encode_on_threads(reformer: StreamReformer) -> StreamReformer {
        let reformer = Arc::new(reformer);
        let mut workers = Vec::new();
        for file in 0..reformer.num_output_files() {
            for slot in 0..reformer.num_encoder_slots(file).unwrap() {
                let reformer = Arc::clone(&reformer);
                workers.push(thread::spawn(move || {
                    for frame in reformer.encoder_frames(file, slot).unwrap() {
                        reformer.mark_encoded(frame).unwrap();
                    }
                }));
            }
        }
        for worker in workers {
            worker.join().unwrap();
        }
        match Arc::try_unwrap(reformer) {
            Ok(reformer) => reformer,
            Err(_) => panic!("workers still hold the reformer"),
        }
    }

    #[test]
    fn test_pipeline_across_pts_wrap() {
        let reformer = StreamReformer::new(capture(), ReformConfig::default()).unwrap();
        assert_eq!(reformer.num_output_files(), 2);
        assert_eq!(reformer.file_frames(0).unwrap().len(), 900);
        assert_eq!(reformer.file_frames(1).unwrap().len(), 600);

        // Timestamps keep counting through the wrap
        let pts = reformer.modified_pts();
        assert!(pts.video.windows(2).all(|w| w[1] - w[0] == PERIOD));

        let mut reformer = encode_on_threads(reformer);
        assert_eq!(reformer.encoded_count(), 1500);
        reformer.reform().unwrap();

        let outputs = reformer.outputs();
        assert_eq!(outputs[0].delivery, 0);
        assert_eq!(outputs[1].delivery, 1);
        assert_eq!(outputs[0].duration(), (900 * PERIOD) as f64);
        assert_eq!(outputs[1].duration(), (600 * PERIOD) as f64);

        // Report positions count from the first frame, not from the raw clock
        let report = reformer.drift_report();
        assert_eq!(report.stream_start, WRAP - 20 * 90_000);
        assert!(!report.to_string().contains("at 2"));

        let stats = reformer.drift_stats();
        assert_eq!(stats.resyncs, 0);
        assert_eq!(stats.skipped_frames, 0);
        assert_eq!(stats.repeated_frames(), 0);
        // Nothing is used twice across the two files
        assert!(stats.unique_frames <= stats.source_frames);
        for out in outputs {
            for ch in 0..2 {
                let list = out.audio(ch);
                assert!(list.windows(2).all(|w| w[1] > w[0]));
            }
        }
    }

    #[tokio::test]
    async fn test_snapshot_restores_identical_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.snap");

        let original = StreamReformer::new(capture(), ReformConfig::default()).unwrap();
        let mut writer = SnapshotWriter::new(File::create(&path).await.unwrap());
        writer.write_reformer(&original).await.unwrap();
        drop(writer);

        let mut reader = SnapshotReader::new(File::open(&path).await.unwrap());
        let restored = reader
            .read_reformer(ReformConfig::default())
            .await
            .unwrap();
        assert_eq!(reader.video_files(), Some(2));
        assert_eq!(restored.sections(), original.sections());
        assert_eq!(restored.formats(), original.formats());

        let mut original = encode_on_threads(original);
        let mut restored = encode_on_threads(restored);
        original.reform().unwrap();
        restored.reform().unwrap();
        assert_eq!(restored.outputs(), original.outputs());
        assert_eq!(restored.drift_stats(), original.drift_stats());
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsreform.toml");
        create_default_config_template(&path).unwrap();
        let mut config = ReformConfig::from_file(&path).unwrap();
        assert_eq!(config, ReformConfig::default());

        // A zero merge window keeps every change as its own section
        config.section_merge_tolerance_secs = 0.0;
        let reformer = StreamReformer::new(capture(), config).unwrap();
        assert_eq!(reformer.num_output_files(), 2);
    }

    #[test]
    fn test_regression_aborts() {
        let hd = VideoFormat::new(CodecType::MPEG2, 1440, 1080, FrameRate::ntsc());
        let aac = AudioFormat::new(CodecType::AAC, 48000, ChannelLayout::Stereo);
        let video = vec![
            VideoFrame::new(100 * 90_000, hd),
            VideoFrame::new(101 * 90_000, hd),
            VideoFrame::new(20 * 90_000, hd),
        ];
        let audio = vec![AudioFrame::new(100 * 90_000, 1024, aac)];
        let events = vec![FormatChange::ChannelCountChanged {
            video_frame: 0,
            channels: 1,
        }];
        let ledger = Ledger::new(video, audio, events).unwrap();
        let err = StreamReformer::new(ledger, ReformConfig::default()).unwrap_err();
        assert!(matches!(err, ReformError::Format(_)));
    }
}
