//! Token account resolution for an (owner, mint) pair.

use solana_sdk::pubkey::Pubkey;

use crate::{
    account::{Asset, SourceAccount},
    error::DistributeError,
    ledger::LedgerRpc,
};

/// Resolves the on-ledger token account that holds a given asset for a
/// given owner, provisioning it at the payer's expense when absent.
///
/// Resolution is idempotent: the same (owner, mint) pair always yields the
/// same handle, and an existing account is never created twice. Failures
/// are propagated, not retried here; retrying is the caller's decision.
#[derive(Clone, Copy)]
pub struct AccountResolver<'a, L: LedgerRpc> {
    ledger: &'a L,
    payer: &'a SourceAccount,
}

impl<'a, L: LedgerRpc> AccountResolver<'a, L> {
    pub fn new(ledger: &'a L, payer: &'a SourceAccount) -> Self {
        Self { ledger, payer }
    }

    pub async fn resolve(&self, owner: &Pubkey, asset: &Asset) -> Result<Pubkey, DistributeError> {
        self.ledger
            .resolve_or_create_account(owner, asset, self.payer)
            .await
            .map_err(|source| DistributeError::AccountResolution { owner: *owner, source })
    }
}
