//! Request hygiene around a [`ChainSource`]
//!
//! Three concerns, composed in one wrapper:
//!
//! - **Retry**: transient transport failures are retried with bounded
//!   exponential backoff.
//! - **Single flight**: at most one request is in flight per query key;
//!   concurrent callers for the same key await the winner's result.
//! - **Cooldown**: a rate-limit signal from the provider suspends
//!   further queries until the cooldown elapses. During the cooldown
//!   read queries return empty/zero results so a stale view can still
//!   render; broadcasts are never silently swallowed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bitcoin::{Address, Amount, Transaction, Txid};
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;

use crate::{ChainError, ChainSource, FeeEstimates, Utxo};

/// Bounded exponential backoff parameters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// How long to hold off after a rate-limit signal.
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            cooldown: Duration::from_secs(30),
        }
    }
}

type Inflight<T> = Mutex<HashMap<String, Arc<OnceCell<T>>>>;

/// A [`ChainSource`] wrapper adding retry, deduplication and cooldown.
pub struct ChainClient<C> {
    inner: Arc<C>,
    policy: RetryPolicy,
    cooldown_until: Mutex<Option<Instant>>,
    inflight_balance: Inflight<Amount>,
    inflight_utxos: Inflight<Vec<Utxo>>,
    inflight_height: Inflight<u32>,
}

impl<C: ChainSource> ChainClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(inner),
            policy,
            cooldown_until: Mutex::new(None),
            inflight_balance: Mutex::new(HashMap::new()),
            inflight_utxos: Mutex::new(HashMap::new()),
            inflight_height: Mutex::new(HashMap::new()),
        }
    }

    /// Whether we are inside a rate-limit cooldown window.
    async fn cooling_down(&self) -> bool {
        let guard = self.cooldown_until.lock().await;
        matches!(*guard, Some(until) if Instant::now() < until)
    }

    async fn enter_cooldown(&self) {
        let mut guard = self.cooldown_until.lock().await;
        *guard = Some(Instant::now() + self.policy.cooldown);
        log::warn!(
            "chain provider rate limited; suspending queries for {:?}",
            self.policy.cooldown
        );
    }

    /// Retry `op` on transient errors with exponential backoff.
    async fn with_retry<T, F, Fut>(&self, mut op: F) -> Result<T, ChainError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ChainError>>,
    {
        let mut delay = self.policy.initial_delay;
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.policy.max_attempts => {
                    log::debug!("transient chain error (attempt {}): {}", attempt, err);
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.policy.max_delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Run `fetch` under single-flight for `key`, degrading rate limits
    /// to `fallback`.
    async fn query<T, F, Fut>(
        &self,
        map: &Inflight<T>,
        key: String,
        fallback: T,
        fetch: F,
    ) -> Result<T, ChainError>
    where
        T: Clone,
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, ChainError>>,
    {
        if self.cooling_down().await {
            return Ok(fallback);
        }

        let cell = {
            let mut guard = map.lock().await;
            guard
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_try_init(|| self.with_retry(fetch))
            .await
            .map(|value| value.clone());
        map.lock().await.remove(&key);

        match result {
            Err(ChainError::RateLimited) => {
                self.enter_cooldown().await;
                Ok(fallback)
            }
            other => other,
        }
    }

    /// Balance of an address; zero while cooling down.
    pub async fn address_balance(&self, address: &Address) -> Result<Amount, ChainError> {
        let inner = self.inner.clone();
        let addr = address.clone();
        self.query(
            &self.inflight_balance,
            format!("balance:{}", address),
            Amount::ZERO,
            move || {
                let inner = inner.clone();
                let addr = addr.clone();
                async move { inner.address_balance(&addr).await }
            },
        )
        .await
    }

    /// Unspent outputs of an address; empty while cooling down.
    pub async fn utxos(&self, address: &Address) -> Result<Vec<Utxo>, ChainError> {
        let inner = self.inner.clone();
        let addr = address.clone();
        self.query(
            &self.inflight_utxos,
            format!("utxos:{}", address),
            Vec::new(),
            move || {
                let inner = inner.clone();
                let addr = addr.clone();
                async move { inner.utxos(&addr).await }
            },
        )
        .await
    }

    /// Best block height; zero while cooling down.
    pub async fn tip_height(&self) -> Result<u32, ChainError> {
        let inner = self.inner.clone();
        self.query(&self.inflight_height, "tip".into(), 0, move || {
            let inner = inner.clone();
            async move { inner.tip_height().await }
        })
        .await
    }

    /// Fee estimates, retried but never deduplicated (cheap, rarely
    /// concurrent).
    pub async fn fee_estimates(&self) -> Result<FeeEstimates, ChainError> {
        self.with_retry(|| self.inner.fee_estimates()).await
    }

    /// Transaction ids touching an address.
    pub async fn transactions(&self, address: &Address) -> Result<Vec<Txid>, ChainError> {
        self.with_retry(|| self.inner.transactions(address)).await
    }

    /// First confirmed funding height for an address.
    pub async fn first_funding_height(
        &self,
        address: &Address,
    ) -> Result<Option<u32>, ChainError> {
        self.with_retry(|| self.inner.first_funding_height(address))
            .await
    }

    /// Broadcast is passed straight through: re-submitting a signed
    /// transaction must be an explicit caller decision, and a rate
    /// limit here is surfaced, never swallowed.
    pub async fn broadcast(&self, tx: &Transaction) -> Result<Txid, ChainError> {
        self.inner.broadcast(tx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bitcoin::Network;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scriptable chain double: a queue of responses per operation.
    struct FlakyChain {
        balance_calls: AtomicU32,
        height_calls: AtomicU32,
        /// Errors to serve before succeeding.
        fail_first: u32,
        /// Serve RateLimited on every balance call when set.
        rate_limited: bool,
        /// Delay each call to widen the single-flight window.
        delay: Duration,
    }

    impl FlakyChain {
        fn new() -> Self {
            Self {
                balance_calls: AtomicU32::new(0),
                height_calls: AtomicU32::new(0),
                fail_first: 0,
                rate_limited: false,
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl ChainSource for FlakyChain {
        async fn address_balance(&self, _address: &Address) -> Result<Amount, ChainError> {
            let call = self.balance_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.rate_limited {
                return Err(ChainError::RateLimited);
            }
            if call < self.fail_first {
                return Err(ChainError::Transport("connection reset".into()));
            }
            Ok(Amount::from_sat(12_345))
        }

        async fn utxos(&self, _address: &Address) -> Result<Vec<Utxo>, ChainError> {
            Ok(Vec::new())
        }

        async fn transactions(&self, _address: &Address) -> Result<Vec<Txid>, ChainError> {
            Ok(Vec::new())
        }

        async fn fee_estimates(&self) -> Result<FeeEstimates, ChainError> {
            Ok(FeeEstimates {
                fast: 20,
                medium: 10,
                slow: 2,
            })
        }

        async fn broadcast(&self, _tx: &Transaction) -> Result<Txid, ChainError> {
            Err(ChainError::BroadcastRejected("test double".into()))
        }

        async fn tip_height(&self) -> Result<u32, ChainError> {
            self.height_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(870_000)
        }

        async fn first_funding_height(
            &self,
            _address: &Address,
        ) -> Result<Option<u32>, ChainError> {
            Ok(Some(860_000))
        }
    }

    fn test_address() -> Address {
        Address::from_str("tb1qgmex2e43kf5zxy5408chn9qmuupqp24h3mu97v")
            .unwrap()
            .require_network(Network::Testnet)
            .unwrap()
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            cooldown: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let mut chain = FlakyChain::new();
        chain.fail_first = 2;
        let client = ChainClient::new(chain, fast_policy());

        let balance = client.address_balance(&test_address()).await.unwrap();
        assert_eq!(balance, Amount::from_sat(12_345));
        assert_eq!(client.inner.balance_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mut chain = FlakyChain::new();
        chain.fail_first = 10;
        let client = ChainClient::new(chain, fast_policy());

        let err = client.address_balance(&test_address()).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(client.inner.balance_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_enters_cooldown_and_degrades() {
        let mut chain = FlakyChain::new();
        chain.rate_limited = true;
        let client = ChainClient::new(chain, fast_policy());

        // First call trips the cooldown; result degrades to zero.
        let balance = client.address_balance(&test_address()).await.unwrap();
        assert_eq!(balance, Amount::ZERO);
        let calls_after_trip = client.inner.balance_calls.load(Ordering::SeqCst);

        // During the cooldown nothing reaches the provider.
        let balance = client.address_balance(&test_address()).await.unwrap();
        assert_eq!(balance, Amount::ZERO);
        assert_eq!(
            client.inner.balance_calls.load(Ordering::SeqCst),
            calls_after_trip
        );

        // After the cooldown the provider is queried again.
        tokio::time::sleep(Duration::from_millis(60)).await;
        let _ = client.address_balance(&test_address()).await;
        assert!(client.inner.balance_calls.load(Ordering::SeqCst) > calls_after_trip);
    }

    #[tokio::test]
    async fn test_concurrent_queries_share_one_flight() {
        let mut chain = FlakyChain::new();
        chain.delay = Duration::from_millis(100);
        let client = Arc::new(ChainClient::new(chain, fast_policy()));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let client = client.clone();
            tasks.push(tokio::spawn(async move { client.tip_height().await }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), 870_000);
        }

        // All eight callers rode a single provider request.
        assert_eq!(client.inner.height_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block_each_other() {
        let chain = FlakyChain::new();
        let client = ChainClient::new(chain, fast_policy());

        let balance = client.address_balance(&test_address()).await.unwrap();
        let height = client.tip_height().await.unwrap();
        assert_eq!(balance, Amount::from_sat(12_345));
        assert_eq!(height, 870_000);
    }

    #[tokio::test]
    async fn test_broadcast_errors_surface() {
        let client = ChainClient::new(FlakyChain::new(), fast_policy());
        let tx = Transaction {
            version: bitcoin::transaction::Version::TWO,
            lock_time: bitcoin::absolute::LockTime::ZERO,
            input: vec![],
            output: vec![],
        };
        assert!(matches!(
            client.broadcast(&tx).await,
            Err(ChainError::BroadcastRejected(_))
        ));
    }
}
