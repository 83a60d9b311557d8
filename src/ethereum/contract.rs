use alloy::primitives::{Address, Bytes, B256, U256};
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::abi::{self, Artifact, ElementExt, Interface};
use super::provider::ChainTransport;
use super::signer::AccountSigner;
use super::value::AbiValue;
use super::{CallRequest, Invocation, Receipt, UnsignedTransaction};
use crate::error::{Error, Result};

pub const DEFAULT_GAS_LIMIT: u64 = 3_000_000;
pub const MIN_GAS_PRICE: u128 = 1_000_000_000;

/// Gas parameters applied when a request leaves them unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    /// Ceiling of the provisional transaction used for estimation.
    pub default_gas_limit: u64,
    /// Wei.
    pub min_gas_price: u128,
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            default_gas_limit: DEFAULT_GAS_LIMIT,
            min_gas_price: MIN_GAS_PRICE,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    pub value: Option<U256>,
    /// 0 asks for an estimate.
    pub gas_limit: u64,
    pub gas_price: Option<u128>,
}

/// What a write transaction carries, before nonce and fees are known.
struct WriteIntent {
    to: Option<Address>,
    input: Bytes,
    value: Option<U256>,
    gas_limit: u64,
    gas_price: Option<u128>,
}

/// Dispatches method calls on a contract through one signer and one transport.
///
/// Read-only methods become `eth_call`s. Everything else is signed and
/// broadcast as an EIP-1559 transaction, then awaited until mined. Writes are
/// serialized from nonce acquisition through broadcast, so concurrent callers
/// sharing an `Invoker` never race for the same nonce.
#[derive(Debug)]
pub struct Invoker<S, T> {
    signer: S,
    transport: T,
    gas: GasPolicy,
    chain_id: OnceCell<u64>,
    write_lock: Mutex<()>,
    span: tracing::Span,
}

impl<S: AccountSigner, T: ChainTransport> Invoker<S, T> {
    pub fn new(signer: S, transport: T) -> Self {
        Self {
            signer,
            transport,
            gas: GasPolicy::default(),
            chain_id: OnceCell::new(),
            write_lock: Mutex::new(()),
            span: tracing::Span::none(),
        }
    }

    pub fn with_gas_policy(mut self, gas: GasPolicy) -> Self {
        self.gas = gas;
        self
    }

    /// Parent span for every invocation.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn signer(&self) -> &S {
        &self.signer
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Chain id of the connected node, queried on first use.
    pub async fn chain_id(&self) -> Result<u64> {
        self.chain_id
            .get_or_try_init(|| self.transport.get_chain_id())
            .await
            .copied()
    }

    pub async fn invoke(
        &self,
        interface: &Interface,
        request: CallRequest,
        cancel: &CancellationToken,
    ) -> Result<Invocation> {
        let span = tracing::info_span!(
            parent: &self.span,
            "invoke",
            method = %request.method,
            to = %request.to
        );

        async move {
            let function = interface
                .find_function(&request.method)
                .ok_or_else(|| Error::MethodNotFound(request.method.clone()))?;

            if function.is_read_only() {
                let data = function.encode_input(&request.args)?;
                tracing::debug!("Calling {} on {}", function.signature(), request.to);
                let output = self.transport.call(request.to, data).await?;
                return Ok(Invocation::Read(function.decode_output(&output)?));
            }

            let input = function.encode_input(&request.args)?;
            let intent = WriteIntent {
                to: Some(request.to),
                input,
                value: request.value,
                gas_limit: request.gas_limit,
                gas_price: request.gas_price,
            };
            let (hash, receipt) = self.execute(intent, cancel).await?;
            Ok(Invocation::Write {
                status: receipt.status,
                tx_hash: format!("{:#x}", hash),
                receipt,
            })
        }
        .instrument(span)
        .await
    }

    /// Deploys the artifact's creation code with `args` passed to its constructor.
    pub async fn deploy(
        &self,
        artifact: &Artifact,
        args: &[AbiValue],
        options: DeployOptions,
        cancel: &CancellationToken,
    ) -> Result<Receipt> {
        let span = tracing::info_span!(parent: &self.span, "deploy");

        async move {
            let bytecode = artifact.bytecode.as_ref().ok_or_else(|| Error::PackFailed {
                method: "constructor".to_string(),
                reason: "artifact has no bytecode".to_string(),
            })?;

            let encoded_args = match artifact.interface.constructor() {
                Some(constructor) => abi::encode_constructor(constructor, args)?,
                None if args.is_empty() => Vec::new(),
                None => {
                    return Err(Error::PackFailed {
                        method: "constructor".to_string(),
                        reason: format!(
                            "interface declares no constructor but {} argument(s) were given",
                            args.len()
                        ),
                    })
                }
            };

            let mut input = bytecode.to_vec();
            input.extend_from_slice(&encoded_args);

            let intent = WriteIntent {
                to: None,
                input: input.into(),
                value: options.value,
                gas_limit: options.gas_limit,
                gas_price: options.gas_price,
            };
            let (_, receipt) = self.execute(intent, cancel).await?;
            if let Some(address) = receipt.contract_address {
                tracing::info!("Contract deployed at {}", address);
            }
            Ok(receipt)
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        intent: WriteIntent,
        cancel: &CancellationToken,
    ) -> Result<(B256, Receipt)> {
        let chain_id = self.chain_id().await?;
        let from = self.signer.address();

        let hash = {
            let _guard = self.write_lock.lock().await;

            let nonce = self.transport.get_nonce(from).await?;
            tracing::debug!("Using nonce {} for {}", nonce, from);

            let gas_price = intent.gas_price.unwrap_or(self.gas.min_gas_price);
            let mut tx = UnsignedTransaction {
                chain_id: Some(chain_id),
                nonce,
                max_priority_fee_per_gas: gas_price,
                max_fee_per_gas: gas_price.saturating_mul(2),
                gas_limit: intent.gas_limit,
                to: intent.to,
                value: intent.value.unwrap_or_default(),
                input: intent.input,
            };

            if tx.gas_limit == 0 {
                tx.gas_limit = self.gas.default_gas_limit;
                let provisional = self.signer.sign_transaction(&tx)?;
                let estimate = self.transport.estimate_gas(&provisional).await?;
                tx.gas_limit = estimate.saturating_add(estimate / 2);
                tracing::debug!("Estimated {} gas, using limit {}", estimate, tx.gas_limit);
            }

            let signed = self.signer.sign_transaction(&tx)?;
            let hash = self.transport.send_raw_transaction(&signed).await?;
            tracing::info!("Sent transaction {:#x} from {}", hash, from);
            hash
        };

        let receipt = self.transport.wait_for_receipt(hash, cancel).await?;
        if !receipt.status {
            tracing::warn!("Transaction {:#x} reverted", hash);
        }
        Ok((hash, receipt))
    }
}
