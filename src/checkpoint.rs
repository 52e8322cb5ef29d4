//! Persisted resume cursor over the recipient list.
//!
//! Batches are fire-and-forget: once the RPC endpoint accepts a transaction
//! the engine treats its recipients as paid and advances the cursor. A
//! re-run after a mid-run failure therefore skips everything up to the last
//! accepted batch instead of resending it.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint file is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Checkpoint {
    /// Number of leading recipients covered by accepted batches.
    cursor: usize,
}

/// File-backed checkpoint, saved after every accepted batch.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    state: Checkpoint,
}

impl CheckpointStore {
    /// Load the checkpoint at `path`, starting fresh if the file does not
    /// exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let path = path.into();
        let state = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            Checkpoint::default()
        };
        Ok(Self { path, state })
    }

    pub fn cursor(&self) -> usize {
        self.state.cursor
    }

    /// Record that a batch covering `transfers` more recipients was
    /// accepted.
    pub fn advance(&mut self, transfers: usize) -> Result<(), CheckpointError> {
        self.state.cursor += transfers;
        self.save()
    }

    /// Discard previous progress and start over from the first recipient.
    pub fn reset(&mut self) -> Result<(), CheckpointError> {
        self.state.cursor = 0;
        self.save()
    }

    fn save(&self) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.state)?)?;
        Ok(())
    }
}

/// Checkpoint path for a given recipient file and mint.
///
/// Derived from a hash over the CSV bytes and the mint so two different
/// distributions never share resume state.
pub fn state_path_for(
    state_dir: &Path,
    csv_path: &Path,
    mint: &Pubkey,
) -> Result<PathBuf, CheckpointError> {
    let mut bytes = fs::read(csv_path)?;
    bytes.extend_from_slice(mint.as_ref());
    let digest = solana_sdk::hash::hash(&bytes).to_string();
    Ok(state_dir.join(format!("{}.json", &digest[..16])))
}
