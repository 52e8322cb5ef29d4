//! Recipient list input: a CSV with a `recipient` column, one owner
//! address per row, distribution order = file order.

use std::{path::Path, str::FromStr};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

#[derive(Debug, Deserialize, Serialize)]
struct RecipientRow {
    recipient: String,
}

pub fn load_recipients(csv_path: &Path) -> Result<Vec<Pubkey>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;
    let mut recipients = Vec::new();

    for result in reader.deserialize() {
        let row: RecipientRow = result?;
        let pubkey = Pubkey::from_str(&row.recipient)
            .with_context(|| format!("Invalid recipient address '{}'", row.recipient))?;
        recipients.push(pubkey);
    }

    Ok(recipients)
}

/// Write a CSV of synthetic recipient addresses, for rehearsing a
/// distribution against a test cluster.
pub fn generate_recipients(count: usize, output: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(["recipient"])?;

    // Seed with the wall clock so repeated runs produce fresh addresses.
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    for i in 0..count {
        let seed = format!("recipient_{timestamp}_{i}");
        let digest = solana_sdk::hash::hash(seed.as_bytes());
        let pubkey = Pubkey::new_from_array(digest.to_bytes());
        writer.write_record([pubkey.to_string()])?;
    }

    writer.flush()?;
    Ok(())
}
