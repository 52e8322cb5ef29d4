//! Source balance validation before distribution starts.

use solana_sdk::pubkey::Pubkey;

use crate::{
    account::{Asset, SourceAccount},
    error::DistributeError,
    ledger::LedgerRpc,
    resolver::AccountResolver,
};

/// Queries the source account's current holdings of the asset, in base
/// units. Runs before any transfer so an underfunded distribution never
/// reaches the ledger.
pub struct BalancePreflight<'a, L: LedgerRpc> {
    ledger: &'a L,
}

impl<'a, L: LedgerRpc> BalancePreflight<'a, L> {
    pub fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    pub async fn check_balance(
        &self,
        asset: &Asset,
        source: &SourceAccount,
    ) -> Result<u64, DistributeError> {
        let owner = source.owner();
        let resolver = AccountResolver::new(self.ledger, source);
        let handle = resolver.resolve(&owner, asset).await.map_err(|err| match err {
            DistributeError::AccountResolution { owner, source } => {
                DistributeError::BalanceQuery { owner, source }
            }
            other => other,
        })?;

        self.query(&owner, &handle).await
    }

    async fn query(&self, owner: &Pubkey, handle: &Pubkey) -> Result<u64, DistributeError> {
        self.ledger
            .get_account_balance(handle)
            .await
            .map_err(|source| DistributeError::BalanceQuery { owner: *owner, source })
    }
}
