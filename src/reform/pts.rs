//! PTS wraparound correction.

use crate::error::{ReformError, Result};
use crate::utils::{format_ticks, wrapped_delta};

use super::Ledger;

/// Wraparound-corrected timestamps for every video and audio frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifiedPts {
    /// Per video frame, in decode order
    pub video: Vec<i64>,
    /// Per audio frame, in decode order
    pub audio: Vec<i64>,
}

impl ModifiedPts {
    /// Normalizes both frame sequences against the first raw video PTS so
    /// the two timelines stay comparable.
    pub fn from_ledger(ledger: &Ledger, max_regression: i64) -> Result<Self> {
        let anchor = ledger.video()[0].pts;
        let video = normalize(ledger.video().iter().map(|f| f.pts), anchor);
        check_regression(&video, max_regression, "video")?;
        let audio = normalize(ledger.audio().iter().map(|f| f.pts), anchor);
        check_regression(&audio, max_regression, "audio")?;
        Ok(Self { video, audio })
    }

    /// Earliest and latest modified video PTS.
    pub fn video_span(&self) -> (i64, i64) {
        let min = self.video.iter().copied().min().unwrap_or(0);
        let max = self.video.iter().copied().max().unwrap_or(0);
        (min, max)
    }
}

/// Accumulates signed 32-bit raw differences, starting from `anchor`.
pub fn normalize<I>(raw: I, anchor: i64) -> Vec<i64>
where
    I: IntoIterator<Item = i64>,
{
    let mut prev_raw = anchor;
    let mut prev_mod = anchor;
    raw.into_iter()
        .map(|pts| {
            prev_mod += wrapped_delta(pts, prev_raw);
            prev_raw = pts;
            prev_mod
        })
        .collect()
}

/// Fails when a modified PTS steps back further than `max_regression` ticks.
pub fn check_regression(modified: &[i64], max_regression: i64, what: &str) -> Result<()> {
    for pair in modified.windows(2) {
        if pair[1] - pair[0] < -max_regression {
            return Err(ReformError::format(format!(
                "{} PTS goes back from {} ({}) to {} ({}); the stream cannot be processed",
                what,
                pair[0],
                format_ticks(pair[0] as f64),
                pair[1],
                format_ticks(pair[1] as f64)
            )));
        }
    }
    Ok(())
}
