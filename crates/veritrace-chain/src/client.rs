/// Keyed chain client: one provider, one signer, one contract binding.
///
/// Built once at startup and shared behind `Arc`. Reads may run
/// concurrently; the nonce-consuming submit path is serialized through an
/// internal mutex so concurrent commits from the same signer can neither
/// skip nor duplicate a nonce.

use crate::error::ChainError;
use ethers::providers::{Http, JsonRpcClient, Middleware, PendingTransaction, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockId, BlockNumber, Transaction, TransactionReceipt, H256, U256};
use log::{debug, warn};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use veritrace_core::config::ChainSettings;
use veritrace_core::types::NetworkInfo;

pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

/// Gas price policy: boost on the Sepolia test chain for prompt inclusion,
/// then enforce the configured floor. A price below the floor tends to
/// strand the transaction in the pool.
pub fn apply_gas_policy(base: U256, chain_id: u64, boost: f64, floor: U256) -> U256 {
    let mut price = base;
    if chain_id == SEPOLIA_CHAIN_ID {
        let numerator = (boost * 100.0).round() as u64;
        price = price * U256::from(numerator) / U256::from(100u64);
    }
    if price < floor {
        floor
    } else {
        price
    }
}

pub struct ChainClient<P: JsonRpcClient> {
    provider: Provider<P>,
    wallet: LocalWallet,
    contract_address: Address,
    /// Expected `from` for verification; the wallet address unless
    /// overridden in configuration.
    issuer: Address,
    chain_id: u64,
    gas_price_boost: f64,
    gas_limit_fallback: u64,
    min_gas_price_wei: U256,
    nonce_guard: Mutex<()>,
}

impl ChainClient<Http> {
    /// HTTP client with bounded per-RPC timeout.
    pub fn connect(settings: &ChainSettings) -> Result<Self, ChainError> {
        let url = reqwest::Url::parse(&settings.rpc_url)
            .map_err(|e| ChainError::Config(format!("invalid RPC_URL: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(settings.rpc_timeout)
            .build()
            .map_err(|e| ChainError::Config(e.to_string()))?;
        let provider = Provider::new(Http::new_with_client(url, http));
        Self::with_provider(provider, settings)
    }
}

impl<P: JsonRpcClient> ChainClient<P> {
    pub fn with_provider(provider: Provider<P>, settings: &ChainSettings) -> Result<Self, ChainError> {
        // Tolerate both 0x-prefixed and bare private keys.
        let wallet: LocalWallet = settings
            .private_key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| ChainError::Config(format!("invalid private key: {e}")))?;
        let wallet = wallet.with_chain_id(settings.chain_id);

        let contract_address: Address = settings
            .contract_address
            .parse()
            .map_err(|e| ChainError::Config(format!("invalid contract address: {e}")))?;

        let issuer = match &settings.issuer_address {
            Some(raw) => raw
                .parse()
                .map_err(|e| ChainError::Config(format!("invalid issuer address: {e}")))?,
            None => wallet.address(),
        };

        Ok(Self {
            provider,
            wallet,
            contract_address,
            issuer,
            chain_id: settings.chain_id,
            gas_price_boost: settings.gas_price_boost,
            gas_limit_fallback: settings.gas_limit_fallback,
            min_gas_price_wei: U256::from(settings.min_gas_price_wei),
            nonce_guard: Mutex::new(()),
        })
    }

    pub fn signer_address(&self) -> Address {
        self.wallet.address()
    }

    pub fn issuer(&self) -> Address {
        self.issuer
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    // ==================== READS ====================

    pub async fn gas_price(&self) -> Result<U256, ChainError> {
        self.provider.get_gas_price().await.map_err(ChainError::rpc)
    }

    pub async fn boosted_gas_price(&self) -> Result<U256, ChainError> {
        let base = self.gas_price().await?;
        Ok(apply_gas_policy(
            base,
            self.chain_id,
            self.gas_price_boost,
            self.min_gas_price_wei,
        ))
    }

    /// Estimate against the current head with a 1.2× safety margin;
    /// fall back to the configured limit when the node refuses to estimate.
    pub async fn estimate_gas_or_fallback(&self, tx: &TypedTransaction) -> U256 {
        match self.provider.estimate_gas(tx, None).await {
            Ok(estimate) => estimate * 12u64 / 10u64,
            Err(err) => {
                warn!("gas estimation failed, using fallback limit: {err}");
                U256::from(self.gas_limit_fallback)
            }
        }
    }

    pub async fn get_transaction(&self, tx_hash: H256) -> Result<Option<Transaction>, ChainError> {
        self.provider
            .get_transaction(tx_hash)
            .await
            .map_err(ChainError::rpc)
    }

    pub async fn get_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(ChainError::rpc)
    }

    pub async fn network_info(&self) -> Result<NetworkInfo, ChainError> {
        let chain_id = self.provider.get_chainid().await.map_err(ChainError::rpc)?;
        let latest_block = self
            .provider
            .get_block_number()
            .await
            .map_err(ChainError::rpc)?;
        let gas_price = self.gas_price().await?;
        let balance = self
            .provider
            .get_balance(self.wallet.address(), None)
            .await
            .map_err(ChainError::rpc)?;
        Ok(NetworkInfo {
            chain_id: chain_id.as_u64(),
            latest_block: latest_block.as_u64(),
            gas_price_wei: gas_price,
            account_balance_wei: balance,
        })
    }

    // ==================== SUBMIT ====================

    /// Fill the nonce, sign, and broadcast, serialized per signer.
    ///
    /// The guard covers nonce fetch through broadcast only; receipt waits
    /// happen outside it so a slow confirmation cannot starve other
    /// committers.
    pub async fn submit(
        &self,
        mut tx: TypedTransaction,
    ) -> Result<(H256, U256, Duration), ChainError> {
        let _guard = self.nonce_guard.lock().await;

        let nonce = self
            .provider
            .get_transaction_count(
                self.wallet.address(),
                Some(BlockId::Number(BlockNumber::Pending)),
            )
            .await
            .map_err(|e| ChainError::classify(e.to_string()))?;
        tx.set_nonce(nonce);

        let signature = self
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| ChainError::Unknown(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);

        let started = Instant::now();
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| ChainError::classify(e.to_string()))?;
        let submit_time = started.elapsed();
        let tx_hash = *pending;
        debug!("broadcast tx {tx_hash:?} nonce {nonce}");

        Ok((tx_hash, nonce, submit_time))
    }

    /// Block on the provider's own receipt polling loop. Unbounded by
    /// design; callers needing a ceiling submit without waiting and poll.
    pub async fn wait_for_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, ChainError> {
        PendingTransaction::new(tx_hash, &self.provider)
            .await
            .map_err(ChainError::rpc)
    }
}
