use std::{fs, path::Path};

use anyhow::{Context, Result};
use solana_sdk::{
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
};

/// The custodial identity authorized to move the token.
///
/// Holds the signing credential, loaded once at process start and immutable
/// afterwards. The same key pays rent for recipient token accounts it has to
/// create.
#[derive(Debug)]
pub struct SourceAccount {
    keypair: Keypair,
}

impl SourceAccount {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Load the signing credential from a JSON keypair file (the standard
    /// `solana-keygen` byte-array format).
    pub fn from_file(path: &Path) -> Result<Self> {
        let keypair_str = fs::read_to_string(path)
            .with_context(|| format!("Failed to read keypair from {}", path.display()))?;

        let keypair_bytes: Vec<u8> = serde_json::from_str(&keypair_str)
            .with_context(|| format!("Failed to parse keypair JSON from {}", path.display()))?;

        let keypair = Keypair::try_from(keypair_bytes.as_slice())
            .with_context(|| format!("Invalid keypair format in {}", path.display()))?;

        Ok(Self { keypair })
    }

    /// Owner identifier, distinct from the token account that holds the
    /// asset for this owner.
    pub fn owner(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn signer(&self) -> &Keypair {
        &self.keypair
    }
}

/// The fungible token being distributed: its mint plus the decimals needed
/// to build `transfer_checked` instructions and echo UI amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Asset {
    pub mint: Pubkey,
    pub decimals: u8,
}

impl Asset {
    pub fn new(mint: Pubkey, decimals: u8) -> Self {
        Self { mint, decimals }
    }

    /// Convert a base-unit amount into display units.
    pub fn ui_amount(&self, amount: u64) -> f64 {
        amount as f64 / 10_f64.powi(self.decimals as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn keypair_roundtrips_through_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("source.json");

        let keypair = Keypair::new();
        let bytes: Vec<u8> = keypair.to_bytes().to_vec();
        let mut file = fs::File::create(&path).unwrap();
        write!(file, "{}", serde_json::to_string(&bytes).unwrap()).unwrap();
        drop(file);

        let source = SourceAccount::from_file(&path).unwrap();
        assert_eq!(source.owner(), keypair.pubkey());
    }

    #[test]
    fn missing_keypair_file_reports_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nope.json");
        let err = SourceAccount::from_file(&path).unwrap_err();
        assert!(format!("{err}").contains("nope.json"));
    }

    #[test]
    fn malformed_keypair_bytes_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("short.json");
        fs::write(&path, "[1,2,3]").unwrap();
        assert!(SourceAccount::from_file(&path).is_err());
    }

    #[test]
    fn ui_amount_uses_decimals() {
        let asset = Asset::new(Pubkey::new_unique(), 6);
        assert_eq!(asset.ui_amount(1_500_000), 1.5);
        assert_eq!(asset.ui_amount(0), 0.0);

        let whole = Asset::new(Pubkey::new_unique(), 0);
        assert_eq!(whole.ui_amount(42), 42.0);
    }
}
