#![doc(html_root_url = "https://docs.rs/tsreform/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsreform - broadcast stream reformation
//!
//! `tsreform` sits between the transport stream demultiplexer and the
//! encoders of a broadcast transcoding pipeline. Given the decode-order record
//! of every video frame, every audio frame and every in-stream format change
//! of one capture, it
//!
//! - unwraps the 33-bit PTS clock into continuous timestamps,
//! - splits the broadcast into format sections, output files and encoder
//!   slots,
//! - tracks which video frames the external encoders have finished,
//! - and rebuilds a drift-corrected audio track for every output file against
//!   the encoded video.
//!
//! It never touches payload bytes. Frame data stays in the source files and is
//! addressed by index and byte offset.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tsreform::config::ReformConfig;
//! use tsreform::format::SnapshotReader;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let file = tokio::fs::File::open("capture.snap").await?;
//!     let reformer = SnapshotReader::new(file)
//!         .read_reformer(ReformConfig::load()?)
//!         .await?;
//!
//!     // Hand frames to the encoders; they report back from their own tasks
//!     let reformer = Arc::new(reformer);
//!     let mut jobs = Vec::new();
//!     for file in 0..reformer.num_output_files() {
//!         for slot in 0..reformer.num_encoder_slots(file)? {
//!             let reformer = Arc::clone(&reformer);
//!             jobs.push(tokio::spawn(async move {
//!                 for frame in reformer.encoder_frames(file, slot)? {
//!                     reformer.mark_encoded(frame)?;
//!                 }
//!                 tsreform::Result::Ok(())
//!             }));
//!         }
//!     }
//!     for job in jobs {
//!         job.await??;
//!     }
//!
//!     // All workers joined: reform the audio
//!     let mut reformer = Arc::try_unwrap(reformer).map_err(|_| "encoder still running")?;
//!     reformer.reform()?;
//!     println!("{}", reformer.drift_report());
//!     println!("{}", reformer.timeline_report());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: frame, format and format-change types
//! - `reform`: the reformation engine
//!   - PTS normalization
//!   - format segmentation
//!   - encoded-frame tracking
//!   - audio synchronization and output indexing
//! - `format`: ledger sources and sinks, including the debug snapshot
//! - `config`: tuning constants, loaded from TOML and the environment
//! - `error`: error taxonomy and `Result` alias
//! - `utils`: clock arithmetic and CRC

/// Frame, format and event types
pub mod av;

/// Error types and utilities
pub mod error;

/// Ledger sources and sinks
pub mod format;

/// The reformation engine
pub mod reform;

/// Common utilities and helper functions
pub mod utils;

/// Configuration module
pub mod config;

pub use error::{ReformError, Result};
pub use reform::{Ledger, StreamReformer};
