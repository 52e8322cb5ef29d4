//! Error taxonomy for a distribution run.
//!
//! Each kind maps to a distinct process exit code so operators can script
//! against failures:
//!
//! | kind                  | exit code |
//! |-----------------------|-----------|
//! | `AccountResolution`   | 10        |
//! | `RetriesExhausted`    | 11        |
//! | `BalanceQuery`        | 12        |
//! | `InsufficientBalance` | 13        |
//! | `Distribution`        | 14        |
//!
//! Anything outside the taxonomy (bad arguments, unreadable input files)
//! exits with 1.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

use crate::{checkpoint::CheckpointError, ledger::LedgerError};

#[derive(Debug, Error)]
pub enum DistributeError {
    /// A recipient or source token account could not be looked up or
    /// created. Aborts the run; not retried at the resolver level.
    #[error("could not resolve token account for owner {owner}")]
    AccountResolution {
        owner: Pubkey,
        #[source]
        source: LedgerError,
    },

    /// A batch submission failed on every attempt up to the configured
    /// maximum. Wraps the last transport/ledger error.
    #[error("batch submission failed after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: LedgerError,
    },

    /// The preflight balance check failed before any transfer was attempted.
    #[error("balance query failed for owner {owner}")]
    BalanceQuery {
        owner: Pubkey,
        #[source]
        source: LedgerError,
    },

    /// The source holds less than the distribution requires. Nothing is
    /// submitted under insufficient funds.
    #[error("insufficient balance: need {required} base units, have {available}")]
    InsufficientBalance { required: u128, available: u64 },

    /// Catch-all for run-level failures outside the kinds above; currently
    /// checkpoint persistence.
    #[error("distribution failed: {0}")]
    Distribution(#[from] CheckpointError),
}

impl DistributeError {
    /// Documented per-kind process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AccountResolution { .. } => 10,
            Self::RetriesExhausted { .. } => 11,
            Self::BalanceQuery { .. } => 12,
            Self::InsufficientBalance { .. } => 13,
            Self::Distribution(_) => 14,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn ledger_err() -> LedgerError {
        LedgerError::Other("boom".into())
    }

    #[test]
    fn exit_codes_are_pairwise_distinct() {
        let owner = Pubkey::new_unique();
        let errors = [
            DistributeError::AccountResolution { owner, source: ledger_err() },
            DistributeError::RetriesExhausted { attempts: 3, source: ledger_err() },
            DistributeError::BalanceQuery { owner, source: ledger_err() },
            DistributeError::InsufficientBalance { required: 600, available: 500 },
            DistributeError::Distribution(CheckpointError::Io(std::io::Error::other(
                "disk full",
            ))),
        ];
        let codes: HashSet<i32> = errors.iter().map(DistributeError::exit_code).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
        assert!(!codes.contains(&1));
    }

    #[test]
    fn insufficient_balance_names_both_amounts() {
        let err = DistributeError::InsufficientBalance { required: 600, available: 500 };
        let msg = err.to_string();
        assert!(msg.contains("600"), "got: {msg}");
        assert!(msg.contains("500"), "got: {msg}");
    }

    #[test]
    fn retries_exhausted_keeps_underlying_error_as_source() {
        use std::error::Error as _;
        let err = DistributeError::RetriesExhausted { attempts: 5, source: ledger_err() };
        assert!(err.to_string().contains("5 attempts"));
        assert_eq!(err.source().unwrap().to_string(), "boom");
    }
}
