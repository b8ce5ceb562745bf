//! # Utility Functions and Types
//!
//! Helpers shared across the crate:
//!
//! - 90 kHz clock arithmetic and display formatting
//! - CRC-32/MPEG-2 checksums
//!
//! ```rust
//! use tsreform::utils::{format_ticks, PTS_HZ};
//!
//! assert_eq!(format_ticks((PTS_HZ * 90) as f64), "00:01:30.000");
//! ```

/// Clock tick conversions and PTS wraparound arithmetic
pub mod clock;

/// CRC calculation
pub mod crc;

pub use clock::*;
pub use crc::Crc32Mpeg2;
