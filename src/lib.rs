//! Batched SPL token distribution over Solana RPC.
//!
//! The engine takes a list of recipient owner addresses, resolves (creating
//! if necessary) the associated token account for each, groups transfers
//! into capacity-bounded batches, and submits one signed transaction per
//! batch with bounded retries. A persisted cursor over the recipient list
//! lets an interrupted run resume without resending completed batches.
//!
//! All network access goes through the [`ledger::LedgerRpc`] seam, so every
//! component can be driven against a test double.

pub mod account;
pub mod checkpoint;
pub mod distributor;
pub mod error;
pub mod ledger;
pub mod preflight;
pub mod recipients;
pub mod resolver;
pub mod retry;
pub mod runner;

pub use account::{Asset, SourceAccount};
pub use checkpoint::CheckpointStore;
pub use distributor::{Batch, BatchDistributor, BatchReceipt, TransferInstruction, BATCH_CAPACITY};
pub use error::DistributeError;
pub use ledger::{LedgerError, LedgerRpc, SolanaLedger, SubmitOptions};
pub use preflight::BalancePreflight;
pub use resolver::AccountResolver;
pub use retry::{RetriesExhausted, RetryExecutor, RetryPolicy};
pub use runner::{DistributionJob, DistributionReport, DistributionRunner};
