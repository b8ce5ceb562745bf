//! Collaborator seams of the engine: where ledgers come from and where
//! engine state goes for debugging.

use crate::reform::{Ledger, StreamReformer};
use crate::Result;

pub mod snapshot;

/// Produces the frame and event ledger of one input stream
#[async_trait::async_trait]
pub trait LedgerSource: Send {
    /// Read the complete ledger
    async fn read_ledger(&mut self) -> Result<Ledger>;
}

/// Persists engine state so it can be rebuilt later
#[async_trait::async_trait]
pub trait LedgerSink: Send {
    /// Write everything needed to reconstruct `reformer`
    async fn write_reformer(&mut self, reformer: &StreamReformer) -> Result<()>;
}

pub use self::snapshot::{decode_snapshot, encode_snapshot, SnapshotReader, SnapshotWriter};
