//! The batching/dispatch engine.
//!
//! Recipients are walked in input order; every [`BATCH_CAPACITY`] transfers
//! (or at the end of the list) the open group is sealed into an immutable
//! [`Batch`] and submitted as a single signed transaction through the retry
//! executor. A batch is submitted together or not at all; there is no
//! partial-batch submission.

use indicatif::{ProgressBar, ProgressStyle};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use tracing::{debug, info};

use crate::{
    account::{Asset, SourceAccount},
    checkpoint::CheckpointStore,
    error::DistributeError,
    ledger::LedgerRpc,
    resolver::AccountResolver,
    retry::RetryExecutor,
};

/// Maximum transfers grouped into one submitted transaction. Ten keeps the
/// serialized transaction comfortably under the packet size limit.
pub const BATCH_CAPACITY: usize = 10;

/// One unit of transfer work. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferInstruction {
    /// Token account the amount leaves.
    pub source: Pubkey,
    /// Token account the amount arrives at.
    pub destination: Pubkey,
    /// Owner authorized to move funds out of `source`.
    pub authority: Pubkey,
    /// Amount in the asset's base units.
    pub amount: u64,
}

/// An ordered group of transfers submitted atomically as one signed
/// transaction. Sealed at construction; the engine builds a fresh value per
/// group instead of mutating a shared accumulator.
#[derive(Debug, Clone)]
pub struct Batch {
    transfers: Vec<TransferInstruction>,
}

impl Batch {
    pub fn new(transfers: Vec<TransferInstruction>) -> Self {
        debug_assert!(transfers.len() <= BATCH_CAPACITY);
        Self { transfers }
    }

    pub fn transfers(&self) -> &[TransferInstruction] {
        &self.transfers
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}

/// Outcome of one accepted batch.
#[derive(Debug, Clone)]
pub struct BatchReceipt {
    pub signature: Signature,
    pub transfers: usize,
}

/// Partitions recipients into batches and drives submission.
pub struct BatchDistributor<'a, L: LedgerRpc> {
    ledger: &'a L,
    retry: RetryExecutor,
}

impl<'a, L: LedgerRpc> BatchDistributor<'a, L> {
    pub fn new(ledger: &'a L, retry: RetryExecutor) -> Self {
        Self { ledger, retry }
    }

    /// Distribute `amount_per_recipient` base units to every recipient, in
    /// input order.
    ///
    /// A recipient whose token account cannot be resolved aborts the whole
    /// run; batches already accepted stay accepted and are recorded in the
    /// checkpoint, so a re-run picks up from the failure point. There is no
    /// skip-and-continue policy.
    pub async fn distribute(
        &self,
        asset: &Asset,
        source: &SourceAccount,
        recipients: &[Pubkey],
        amount_per_recipient: u64,
        mut checkpoint: Option<&mut CheckpointStore>,
    ) -> Result<Vec<BatchReceipt>, DistributeError> {
        let done = checkpoint
            .as_ref()
            .map(|store| store.cursor())
            .unwrap_or(0)
            .min(recipients.len());
        let remaining = &recipients[done..];

        if remaining.is_empty() {
            debug!(total = recipients.len(), "nothing left to distribute");
            return Ok(Vec::new());
        }
        if done > 0 {
            info!(done, total = recipients.len(), "resuming from checkpoint");
        }

        let resolver = AccountResolver::new(self.ledger, source);
        let source_handle = resolver.resolve(&source.owner(), asset).await?;

        let pb = ProgressBar::new(remaining.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} transferring")
        {
            pb.set_style(style.progress_chars("##-"));
        }

        let mut open = Vec::with_capacity(BATCH_CAPACITY);
        let mut receipts = Vec::new();

        for (idx, recipient) in remaining.iter().enumerate() {
            let destination = resolver.resolve(recipient, asset).await?;
            open.push(TransferInstruction {
                source: source_handle,
                destination,
                authority: source.owner(),
                amount: amount_per_recipient,
            });

            let is_last = idx + 1 == remaining.len();
            if open.len() == BATCH_CAPACITY || is_last {
                let batch = Batch::new(std::mem::replace(
                    &mut open,
                    Vec::with_capacity(BATCH_CAPACITY),
                ));
                let receipt = self.submit(asset, &batch, source).await?;
                if let Some(store) = checkpoint.as_deref_mut() {
                    store.advance(batch.len())?;
                }
                pb.inc(batch.len() as u64);
                info!(
                    signature = %receipt.signature,
                    transfers = batch.len(),
                    "batch submitted"
                );
                receipts.push(receipt);
            }
        }

        pb.finish_with_message("all batches submitted");
        Ok(receipts)
    }

    async fn submit(
        &self,
        asset: &Asset,
        batch: &Batch,
        source: &SourceAccount,
    ) -> Result<BatchReceipt, DistributeError> {
        let signature = self
            .retry
            .execute("submit signed batch", || {
                self.ledger.submit_signed_batch(asset, batch, source)
            })
            .await
            .map_err(|err| DistributeError::RetriesExhausted {
                attempts: err.attempts,
                source: err.last,
            })?;

        Ok(BatchReceipt { signature, transfers: batch.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ledger::testing::{derived_handle, StubLedger},
        retry::RetryPolicy,
    };
    use solana_sdk::signature::Keypair;
    use std::{sync::atomic::Ordering, time::Duration};
    use tempfile::TempDir;

    fn retry(max_attempts: u32) -> RetryExecutor {
        RetryExecutor::new(RetryPolicy::constant(Duration::ZERO), max_attempts)
    }

    fn fixture() -> (StubLedger, SourceAccount, Asset) {
        (
            StubLedger::with_balance(u64::MAX),
            SourceAccount::new(Keypair::new()),
            Asset::new(Pubkey::new_unique(), 6),
        )
    }

    fn owners(n: usize) -> Vec<Pubkey> {
        (0..n).map(|_| Pubkey::new_unique()).collect()
    }

    #[tokio::test]
    async fn twenty_four_recipients_make_three_batches() {
        let (ledger, source, asset) = fixture();
        let distributor = BatchDistributor::new(&ledger, retry(3));
        let recipients = owners(24);

        let receipts = distributor
            .distribute(&asset, &source, &recipients, 100, None)
            .await
            .unwrap();

        assert_eq!(ledger.submitted_sizes(), vec![10, 10, 4]);
        assert_eq!(receipts.len(), 3);
        assert_eq!(receipts.iter().map(|r| r.transfers).sum::<usize>(), 24);
    }

    #[tokio::test]
    async fn evenly_divisible_list_ends_with_full_batch() {
        let (ledger, source, asset) = fixture();
        let distributor = BatchDistributor::new(&ledger, retry(3));
        let recipients = owners(20);

        distributor
            .distribute(&asset, &source, &recipients, 5, None)
            .await
            .unwrap();

        assert_eq!(ledger.submitted_sizes(), vec![10, 10]);
    }

    #[tokio::test]
    async fn zero_recipients_is_a_successful_noop() {
        let (ledger, source, asset) = fixture();
        let distributor = BatchDistributor::new(&ledger, retry(3));

        let receipts = distributor
            .distribute(&asset, &source, &[], 100, None)
            .await
            .unwrap();

        assert!(receipts.is_empty());
        assert_eq!(ledger.submission_count(), 0);
        assert_eq!(ledger.lookup_count(), 0);
    }

    #[tokio::test]
    async fn batches_preserve_recipient_order() {
        let (ledger, source, asset) = fixture();
        let distributor = BatchDistributor::new(&ledger, retry(3));
        let recipients = owners(17);

        distributor
            .distribute(&asset, &source, &recipients, 250, None)
            .await
            .unwrap();

        let source_handle = derived_handle(&source.owner(), &asset.mint);
        let submitted: Vec<TransferInstruction> =
            ledger.submitted_batches().into_iter().flatten().collect();
        assert_eq!(submitted.len(), 17);
        for (recipient, transfer) in recipients.iter().zip(&submitted) {
            assert_eq!(transfer.destination, derived_handle(recipient, &asset.mint));
            assert_eq!(transfer.source, source_handle);
            assert_eq!(transfer.authority, source.owner());
            assert_eq!(transfer.amount, 250);
        }
    }

    #[tokio::test]
    async fn unresolvable_recipient_aborts_after_accepted_batches() {
        let (mut ledger, source, asset) = fixture();
        let recipients = owners(15);
        // recipient 12 sits in the second batch
        ledger.refuse_owner = Some(recipients[12]);
        let distributor = BatchDistributor::new(&ledger, retry(3));

        let err = distributor
            .distribute(&asset, &source, &recipients, 100, None)
            .await
            .unwrap_err();

        assert!(matches!(err, DistributeError::AccountResolution { .. }));
        assert_eq!(ledger.submitted_sizes(), vec![10]);
    }

    #[tokio::test]
    async fn transient_submission_failure_is_retried() {
        let (ledger, source, asset) = fixture();
        ledger.fail_first_attempts.store(1, Ordering::SeqCst);
        let distributor = BatchDistributor::new(&ledger, retry(3));
        let recipients = owners(5);

        let receipts = distributor
            .distribute(&asset, &source, &recipients, 100, None)
            .await
            .unwrap();

        assert_eq!(receipts.len(), 1);
        assert_eq!(ledger.submission_count(), 1);
        assert_eq!(ledger.submit_attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_submission_failure_exhausts_retries() {
        let (mut ledger, source, asset) = fixture();
        ledger.fail_after_batches = Some(0);
        let distributor = BatchDistributor::new(&ledger, retry(3));
        let recipients = owners(4);

        let err = distributor
            .distribute(&asset, &source, &recipients, 100, None)
            .await
            .unwrap_err();

        match err {
            DistributeError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ledger.submit_attempts.load(Ordering::SeqCst), 3);
        assert_eq!(ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn checkpoint_advances_per_accepted_batch_and_stops_on_failure() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = CheckpointStore::load(temp_dir.path().join("state.json")).unwrap();

        let (mut ledger, source, asset) = fixture();
        ledger.fail_after_batches = Some(1);
        let distributor = BatchDistributor::new(&ledger, retry(2));
        let recipients = owners(24);

        let err = distributor
            .distribute(&asset, &source, &recipients, 100, Some(&mut store))
            .await
            .unwrap_err();

        assert!(matches!(err, DistributeError::RetriesExhausted { .. }));
        assert_eq!(store.cursor(), 10);
    }

    #[tokio::test]
    async fn resumed_run_submits_only_remaining_recipients() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = CheckpointStore::load(temp_dir.path().join("state.json")).unwrap();
        store.advance(10).unwrap();

        let (ledger, source, asset) = fixture();
        let distributor = BatchDistributor::new(&ledger, retry(3));
        let recipients = owners(24);

        distributor
            .distribute(&asset, &source, &recipients, 100, Some(&mut store))
            .await
            .unwrap();

        assert_eq!(ledger.submitted_sizes(), vec![10, 4]);
        assert_eq!(store.cursor(), 24);

        let first_resumed = &ledger.submitted_batches()[0][0];
        assert_eq!(
            first_resumed.destination,
            derived_handle(&recipients[10], &asset.mint)
        );
    }

    #[tokio::test]
    async fn fully_checkpointed_run_touches_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = CheckpointStore::load(temp_dir.path().join("state.json")).unwrap();
        store.advance(6).unwrap();

        let (ledger, source, asset) = fixture();
        let distributor = BatchDistributor::new(&ledger, retry(3));
        let recipients = owners(6);

        let receipts = distributor
            .distribute(&asset, &source, &recipients, 100, Some(&mut store))
            .await
            .unwrap();

        assert!(receipts.is_empty());
        assert_eq!(ledger.lookup_count(), 0);
        assert_eq!(ledger.submission_count(), 0);
    }
}
