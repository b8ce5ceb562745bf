//! Frame to format assignment and encode-completion flags.

use bitvec::prelude::*;
use parking_lot::RwLock;

use crate::error::{ReformError, Result};

/// Video frame to output format assignment, plus the per-frame "encoded"
/// flags set by encode workers.
///
/// The assignment is fixed at construction. The flags sit behind one lock so
/// completion callbacks on many threads can mark frames through a shared
/// reference.
#[derive(Debug)]
pub struct FrameMap {
    formats: Vec<usize>,
    encoded: RwLock<BitVec>,
}

impl FrameMap {
    /// All frames start out unencoded.
    pub fn new(formats: Vec<usize>) -> Self {
        let encoded = RwLock::new(bitvec![0; formats.len()]);
        Self { formats, encoded }
    }

    /// Number of video frames.
    pub fn len(&self) -> usize {
        self.formats.len()
    }

    /// True for a stream without video frames.
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    /// Output format id of video frame `frame`.
    pub fn format_of(&self, frame: usize) -> Option<usize> {
        self.formats.get(frame).copied()
    }

    /// Output format id of every video frame.
    pub fn formats(&self) -> &[usize] {
        &self.formats
    }

    /// Flags `frame` as encoded. Fails with `ReformError::Internal` for an
    /// index outside the stream.
    pub fn mark_encoded(&self, frame: usize) -> Result<()> {
        let mut encoded = self.encoded.write();
        if frame >= encoded.len() {
            return Err(ReformError::internal(format!(
                "cannot mark frame {} encoded, stream has {} video frames",
                frame,
                encoded.len()
            )));
        }
        encoded.set(frame, true);
        Ok(())
    }

    /// Whether `frame` has been marked encoded.
    pub fn is_encoded(&self, frame: usize) -> bool {
        self.encoded.read().get(frame).map_or(false, |bit| *bit)
    }

    /// Number of frames marked encoded.
    pub fn encoded_count(&self) -> usize {
        self.encoded.read().count_ones()
    }

    /// Lock-free view of the flags for the exclusive reformation pass.
    pub fn encoded_exclusive(&mut self) -> &BitSlice {
        self.encoded.get_mut().as_bitslice()
    }

    /// Clears every flag.
    pub fn reset_encoded(&mut self) {
        self.encoded.get_mut().fill(false);
    }
}
