use alloy::network::ReceiptResponse;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{Receipt, SignedTransaction};
use crate::error::{Error, Result};

/// How long and how often to poll for a transaction receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ReceiptPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    /// Limit on the chain-id round trip done on connect.
    pub connect_timeout: Duration,
    pub receipt: ReceiptPolicy,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            receipt: ReceiptPolicy::default(),
        }
    }
}

/// Node access needed to read contract state and push signed transactions.
///
/// Queries are stateless; implementations must be safe to share across tasks.
#[async_trait]
pub trait ChainTransport: Send + Sync {
    async fn get_balance(&self, address: Address) -> Result<U256>;

    /// Transaction count at the `pending` block tag.
    async fn get_nonce(&self, address: Address) -> Result<u64>;

    async fn get_chain_id(&self) -> Result<u64>;

    /// `eth_call` against the latest state.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;

    async fn estimate_gas(&self, tx: &SignedTransaction) -> Result<u64>;

    async fn send_raw_transaction(&self, tx: &SignedTransaction) -> Result<B256>;

    /// `Ok(None)` while the transaction is not mined yet.
    async fn get_receipt(&self, hash: B256) -> Result<Option<Receipt>>;

    fn receipt_policy(&self) -> ReceiptPolicy {
        ReceiptPolicy::default()
    }

    async fn wait_for_receipt(&self, hash: B256, cancel: &CancellationToken) -> Result<Receipt> {
        poll_for_receipt(hash, self.receipt_policy(), cancel, || self.get_receipt(hash)).await
    }
}

/// Polls `fetch` until it yields a receipt.
///
/// Pending (`None`) responses are retried every `poll_interval`; any error ends
/// the wait immediately. Fails with `ReceiptTimeout` once `timeout` has elapsed
/// and with `Cancelled` as soon as `cancel` fires.
pub async fn poll_for_receipt<F, Fut>(
    hash: B256,
    policy: ReceiptPolicy,
    cancel: &CancellationToken,
    mut fetch: F,
) -> Result<Receipt>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<Receipt>>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let timed_out = || Error::ReceiptTimeout {
        hash,
        waited: started.elapsed(),
    };

    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled { hash }),
            outcome = tokio::time::timeout_at(deadline, fetch()) => outcome,
        };

        match outcome {
            Err(_) => return Err(timed_out()),
            Ok(Err(e)) => return Err(e),
            Ok(Ok(Some(receipt))) => return Ok(receipt),
            Ok(Ok(None)) => tracing::debug!("Transaction {:#x} not mined yet", hash),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(timed_out());
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled { hash }),
            _ = tokio::time::sleep(policy.poll_interval.min(deadline - now)) => {}
        }
    }
}

/// JSON-RPC over HTTP, backed by the alloy provider.
#[derive(Debug)]
pub struct HttpTransport {
    url: String,
    provider: RootProvider<Http<Client>>,
    receipt: ReceiptPolicy,
}

impl HttpTransport {
    /// Connects and fails fast if the node does not answer `eth_chainId` in time.
    pub async fn connect(url: &str, options: TransportOptions) -> Result<Self> {
        let connection_error = |source: crate::error::BoxError| Error::Connection {
            url: url.to_string(),
            source,
        };

        let parsed: Url = url
            .parse()
            .map_err(|e: url::ParseError| connection_error(Box::new(e)))?;
        let provider = ProviderBuilder::new().on_http(parsed);

        let chain_id = tokio::time::timeout(options.connect_timeout, provider.get_chain_id())
            .await
            .map_err(|e| connection_error(Box::new(e)))?
            .map_err(|e| connection_error(Box::new(e)))?;
        tracing::info!("Connected to {} (chain id {})", url, chain_id);

        Ok(Self {
            url: url.to_string(),
            provider,
            receipt: options.receipt,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChainTransport for HttpTransport {
    async fn get_balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| Error::BalanceQueryFailed {
                address,
                source: Box::new(e),
            })
    }

    async fn get_nonce(&self, address: Address) -> Result<u64> {
        self.provider
            .get_transaction_count(address)
            .pending()
            .await
            .map_err(|e| Error::NonceQueryFailed {
                address,
                source: Box::new(e),
            })
    }

    async fn get_chain_id(&self) -> Result<u64> {
        self.provider
            .get_chain_id()
            .await
            .map_err(|e| Error::ChainIdQueryFailed(Box::new(e)))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let request = TransactionRequest::default().to(to).input(data.into());
        self.provider
            .call(&request)
            .await
            .map_err(|e| Error::CallFailed {
                to,
                source: Box::new(e),
            })
    }

    async fn estimate_gas(&self, tx: &SignedTransaction) -> Result<u64> {
        let mut request = TransactionRequest::default()
            .from(tx.from)
            .value(tx.tx.value)
            .input(tx.tx.input.clone().into())
            .nonce(tx.tx.nonce)
            .max_fee_per_gas(tx.tx.max_fee_per_gas)
            .max_priority_fee_per_gas(tx.tx.max_priority_fee_per_gas);
        if let Some(to) = tx.tx.to {
            request = request.to(to);
        }

        self.provider
            .estimate_gas(&request)
            .await
            .map_err(|e| Error::EstimateFailed(Box::new(e)))
    }

    async fn send_raw_transaction(&self, tx: &SignedTransaction) -> Result<B256> {
        let pending = self
            .provider
            .send_raw_transaction(&tx.raw)
            .await
            .map_err(|e| Error::SendFailed(Box::new(e)))?;
        Ok(*pending.tx_hash())
    }

    async fn get_receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        self.provider
            .get_transaction_receipt(hash)
            .await
            .map(|receipt| receipt.as_ref().map(receipt_from_rpc))
            .map_err(|e| Error::ReceiptQueryFailed {
                hash,
                source: Box::new(e),
            })
    }

    fn receipt_policy(&self) -> ReceiptPolicy {
        self.receipt
    }
}

fn receipt_from_rpc(receipt: &TransactionReceipt) -> Receipt {
    Receipt {
        transaction_hash: receipt.transaction_hash,
        status: receipt.status(),
        gas_used: receipt.gas_used() as u64,
        block_number: receipt.block_number,
        contract_address: receipt.contract_address,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy() -> ReceiptPolicy {
        ReceiptPolicy {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(200),
        }
    }

    fn receipt(hash: B256) -> Receipt {
        Receipt {
            transaction_hash: hash,
            status: true,
            gas_used: 21_000,
            block_number: Some(12),
            contract_address: None,
        }
    }

    #[tokio::test]
    async fn test_poll_keeps_waiting_while_pending() {
        let hash = B256::repeat_byte(1);
        let calls = AtomicUsize::new(0);
        let cancel = CancellationToken::new();

        let found = poll_for_receipt(hash, fast_policy(), &cancel, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Ok(None)
                } else {
                    Ok(Some(receipt(hash)))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(found, receipt(hash));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_poll_aborts_on_rpc_error() {
        let hash = B256::repeat_byte(2);
        let calls = AtomicUsize::new(0);
        let cancel = CancellationToken::new();

        let err = poll_for_receipt(hash, fast_policy(), &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Err(Error::ReceiptQueryFailed {
                    hash,
                    source: "header not found".into(),
                })
            }
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ReceiptQueryFailed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_poll_times_out() {
        let hash = B256::repeat_byte(3);
        let cancel = CancellationToken::new();

        let err = poll_for_receipt(hash, fast_policy(), &cancel, || async { Ok(None) })
            .await
            .unwrap_err();

        match err {
            Error::ReceiptTimeout { hash: h, waited } => {
                assert_eq!(h, hash);
                assert!(waited >= fast_policy().timeout);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_poll_times_out_on_hanging_fetch() {
        let hash = B256::repeat_byte(4);
        let cancel = CancellationToken::new();

        let err = poll_for_receipt(hash, fast_policy(), &cancel, || {
            std::future::pending::<Result<Option<Receipt>>>()
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ReceiptTimeout);
    }

    #[tokio::test]
    async fn test_poll_can_be_cancelled() {
        let hash = B256::repeat_byte(5);
        let cancel = CancellationToken::new();
        let policy = ReceiptPolicy {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(300),
        };
        let calls = AtomicUsize::new(0);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = poll_for_receipt(hash, policy, &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(None) }
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let err = HttpTransport::connect("not a url", TransportOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_connect_fails_fast_without_node() {
        let options = TransportOptions {
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let started = std::time::Instant::now();
        let err = HttpTransport::connect("http://127.0.0.1:1", options)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
