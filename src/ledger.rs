//! The ledger RPC collaborator.
//!
//! [`LedgerRpc`] is the seam between the distribution engine and the remote
//! ledger: account resolution, balance queries, and signed batch submission
//! all go through it. [`SolanaLedger`] is the production implementation over
//! the nonblocking RPC client; tests drive the engine against a stub.

use std::{num::NonZeroU32, sync::Arc};

use governor::{Quota, RateLimiter};
use solana_client::{
    client_error::ClientError,
    nonblocking::rpc_client::RpcClient,
    rpc_config::RpcSendTransactionConfig,
};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    compute_budget::ComputeBudgetInstruction,
    instruction::Instruction,
    message::{Message, VersionedMessage},
    program_pack::Pack,
    pubkey::Pubkey,
    signature::Signature,
    signer::SignerError,
    transaction::VersionedTransaction,
};
use spl_associated_token_account::{
    get_associated_token_address,
    instruction::create_associated_token_account_idempotent,
};
use spl_token::state::{Account as TokenAccount, Mint};
use thiserror::Error;

use crate::{
    account::{Asset, SourceAccount},
    distributor::Batch,
};

/// Failure reported by the ledger collaborator.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Transport or RPC-level failure from the client.
    #[error("rpc request failed: {0}")]
    Rpc(Box<ClientError>),

    /// The account exists but its data did not unpack as expected.
    #[error("account {0} holds unexpected data")]
    InvalidAccountData(Pubkey),

    /// The transaction could not be built or signed locally.
    #[error("could not build transaction: {0}")]
    Transaction(String),

    /// Free-form failure, used by adapters and test doubles.
    #[error("{0}")]
    Other(String),
}

impl From<ClientError> for LedgerError {
    fn from(err: ClientError) -> Self {
        Self::Rpc(Box::new(err))
    }
}

impl From<SignerError> for LedgerError {
    fn from(err: SignerError) -> Self {
        Self::Transaction(err.to_string())
    }
}

/// Submission knobs carried alongside every signed batch.
#[derive(Debug, Clone, Copy)]
pub struct SubmitOptions {
    pub commitment: CommitmentConfig,
    /// Skip the RPC node's simulation preflight. Baseline keeps it enabled.
    pub skip_preflight: bool,
    /// Compute unit price in microlamports.
    pub priority_fee: u64,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            commitment: CommitmentConfig::confirmed(),
            skip_preflight: false,
            priority_fee: 1_000,
        }
    }
}

/// Operations the engine consumes from the remote ledger.
#[allow(async_fn_in_trait)]
pub trait LedgerRpc {
    /// Derive the token account holding `asset` for `owner`, creating it at
    /// the payer's expense if it does not exist. Idempotent per
    /// (owner, mint) pair.
    async fn resolve_or_create_account(
        &self,
        owner: &Pubkey,
        asset: &Asset,
        payer: &SourceAccount,
    ) -> Result<Pubkey, LedgerError>;

    /// Current amount held by a token account, in base units.
    async fn get_account_balance(&self, handle: &Pubkey) -> Result<u64, LedgerError>;

    /// Sign the batch with the source authority and submit it as one
    /// transaction. Returns the transaction signature.
    async fn submit_signed_batch(
        &self,
        asset: &Asset,
        batch: &Batch,
        authority: &SourceAccount,
    ) -> Result<Signature, LedgerError>;
}

type DirectLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Production ledger over the Solana JSON-RPC interface.
///
/// Explicitly constructed and passed into each component; submissions are
/// rate limited so large distributions stay under the endpoint's quota.
pub struct SolanaLedger {
    client: Arc<RpcClient>,
    options: SubmitOptions,
    limiter: DirectLimiter,
}

impl SolanaLedger {
    pub fn new(client: Arc<RpcClient>, options: SubmitOptions, rate_limit: NonZeroU32) -> Self {
        Self {
            client,
            options,
            limiter: RateLimiter::direct(Quota::per_second(rate_limit)),
        }
    }

    /// Fetch the mint and return the asset with its on-ledger decimals.
    pub async fn fetch_asset(&self, mint: Pubkey) -> Result<Asset, LedgerError> {
        let account = self.client.get_account(&mint).await?;
        let mint_data =
            Mint::unpack(&account.data).map_err(|_| LedgerError::InvalidAccountData(mint))?;
        Ok(Asset::new(mint, mint_data.decimals))
    }

    fn with_compute_budget(&self, instructions: &[Instruction]) -> Vec<Instruction> {
        let mut all = vec![
            ComputeBudgetInstruction::set_compute_unit_limit(200_000),
            ComputeBudgetInstruction::set_compute_unit_price(self.options.priority_fee),
        ];
        all.extend_from_slice(instructions);
        all
    }

    async fn sign_and_send(
        &self,
        instructions: &[Instruction],
        payer: &SourceAccount,
        confirm: bool,
    ) -> Result<Signature, LedgerError> {
        self.limiter.until_ready().await;

        let blockhash = self.client.get_latest_blockhash().await?;
        let message = VersionedMessage::Legacy(Message::new_with_blockhash(
            &self.with_compute_budget(instructions),
            Some(&payer.owner()),
            &blockhash,
        ));
        let tx = VersionedTransaction::try_new(message, &[payer.signer()])?;

        if confirm {
            Ok(self.client.send_and_confirm_transaction(&tx).await?)
        } else {
            let config = RpcSendTransactionConfig {
                skip_preflight: self.options.skip_preflight,
                preflight_commitment: Some(self.options.commitment.commitment),
                ..Default::default()
            };
            Ok(self.client.send_transaction_with_config(&tx, config).await?)
        }
    }
}

impl LedgerRpc for SolanaLedger {
    async fn resolve_or_create_account(
        &self,
        owner: &Pubkey,
        asset: &Asset,
        payer: &SourceAccount,
    ) -> Result<Pubkey, LedgerError> {
        let handle = get_associated_token_address(owner, &asset.mint);

        let existing = self
            .client
            .get_account_with_commitment(&handle, self.options.commitment)
            .await?;
        if existing.value.is_some() {
            return Ok(handle);
        }

        // Creation is idempotent on-ledger, so a concurrent creator is
        // harmless. Creation failures are the caller's to handle.
        let ix = create_associated_token_account_idempotent(
            &payer.owner(),
            owner,
            &asset.mint,
            &spl_token::id(),
        );
        self.sign_and_send(&[ix], payer, true).await?;
        Ok(handle)
    }

    async fn get_account_balance(&self, handle: &Pubkey) -> Result<u64, LedgerError> {
        let account = self.client.get_account(handle).await?;
        let token_account = TokenAccount::unpack(&account.data)
            .map_err(|_| LedgerError::InvalidAccountData(*handle))?;
        Ok(token_account.amount)
    }

    async fn submit_signed_batch(
        &self,
        asset: &Asset,
        batch: &Batch,
        authority: &SourceAccount,
    ) -> Result<Signature, LedgerError> {
        let mut instructions = Vec::with_capacity(batch.len());
        for transfer in batch.transfers() {
            let ix = spl_token::instruction::transfer_checked(
                &spl_token::id(),
                &transfer.source,
                &asset.mint,
                &transfer.destination,
                &transfer.authority,
                &[],
                transfer.amount,
                asset.decimals,
            )
            .map_err(|e| LedgerError::Transaction(e.to_string()))?;
            instructions.push(ix);
        }

        self.sign_and_send(&instructions, authority, false).await
    }
}
