//! Top-level sequencing: preflight, then distribute, then report.

use solana_sdk::{pubkey::Pubkey, signature::Signature};
use tracing::info;

use crate::{
    account::{Asset, SourceAccount},
    checkpoint::CheckpointStore,
    distributor::{BatchDistributor, BatchReceipt},
    error::DistributeError,
    ledger::LedgerRpc,
    preflight::BalancePreflight,
    retry::RetryExecutor,
};

/// Everything one run consumes: the asset, the custodial source, the
/// recipient owners in distribution order, and the uniform amount each
/// receives.
pub struct DistributionJob {
    pub asset: Asset,
    pub source: SourceAccount,
    pub recipients: Vec<Pubkey>,
    pub amount_per_recipient: u64,
}

impl DistributionJob {
    /// Base units still required, for the recipients not yet covered by the
    /// checkpoint. Exact integer arithmetic; widened so it cannot overflow.
    fn required(&self, done: usize) -> u128 {
        let remaining = self.recipients.len().saturating_sub(done) as u128;
        self.amount_per_recipient as u128 * remaining
    }
}

/// Terminal outcome of a successful run.
#[derive(Debug)]
pub struct DistributionReport {
    pub receipts: Vec<BatchReceipt>,
}

impl DistributionReport {
    pub fn batches(&self) -> usize {
        self.receipts.len()
    }

    pub fn transfers(&self) -> usize {
        self.receipts.iter().map(|r| r.transfers).sum()
    }

    pub fn signatures(&self) -> impl Iterator<Item = &Signature> {
        self.receipts.iter().map(|r| &r.signature)
    }
}

/// Runs a distribution end to end. Does not retry at this level; retries
/// live inside batch submission.
pub struct DistributionRunner<'a, L: LedgerRpc> {
    ledger: &'a L,
    retry: RetryExecutor,
}

impl<'a, L: LedgerRpc> DistributionRunner<'a, L> {
    pub fn new(ledger: &'a L, retry: RetryExecutor) -> Self {
        Self { ledger, retry }
    }

    pub async fn run(
        &self,
        job: &DistributionJob,
        mut checkpoint: Option<&mut CheckpointStore>,
    ) -> Result<DistributionReport, DistributeError> {
        let done = checkpoint.as_ref().map(|store| store.cursor()).unwrap_or(0);
        let required = job.required(done);

        let available = BalancePreflight::new(self.ledger)
            .check_balance(&job.asset, &job.source)
            .await?;
        if (available as u128) < required {
            return Err(DistributeError::InsufficientBalance { required, available });
        }

        let receipts = BatchDistributor::new(self.ledger, self.retry.clone())
            .distribute(
                &job.asset,
                &job.source,
                &job.recipients,
                job.amount_per_recipient,
                checkpoint.as_deref_mut(),
            )
            .await?;

        let report = DistributionReport { receipts };
        info!(
            batches = report.batches(),
            transfers = report.transfers(),
            "distribution complete"
        );
        Ok(report)
    }
}
