use alloy::primitives::{Address, U256};
use anyhow::{anyhow, Result};
use rmcp::{
    model::{ServerCapabilities, ServerInfo},
    tool,
    transport::stdio,
    ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    error::Error,
    ethereum::{
        abi::{Element, ElementExt, Interface},
        contract::Invoker,
        provider::{ChainTransport, HttpTransport},
        signer::{AccountSigner, LocalSigner},
        utils, value, CallRequest, CallResult,
    },
};

pub type DefaultInvoker = Invoker<LocalSigner, HttpTransport>;

/// Limits applied to state-changing calls before anything is signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    pub allow_writes: bool,
    pub max_value: Option<U256>,
}

impl WritePolicy {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            allow_writes: config.security.allow_write_operations,
            max_value: config.max_transaction_value()?,
        })
    }

    pub fn check(&self, value: Option<U256>) -> Result<()> {
        if !self.allow_writes {
            return Err(anyhow!(
                "Write operations are disabled. Use --allow-writes flag to enable transaction sending."
            ));
        }

        if let (Some(value), Some(max)) = (value, self.max_value) {
            if value > max {
                return Err(anyhow!(
                    "Transaction value {} wei exceeds the configured maximum of {} wei",
                    value,
                    max
                ));
            }
        }

        Ok(())
    }
}

/// The signer used by the server and the CLI.
///
/// Without a key, a throwaway key stands in unless `require_key` is set; a
/// session that may send transactions always requires one.
pub fn signer_from_key(private_key: Option<&str>, require_key: bool) -> Result<LocalSigner> {
    match private_key {
        Some(key) => Ok(LocalSigner::from_hex(key)?),
        None if require_key => Err(anyhow!(
            "No private key configured. Set the environment variable named by signer.private_key_env"
        )),
        None => {
            let signer = LocalSigner::random();
            warn!(
                "No private key configured, using ephemeral signer {}",
                signer.address()
            );
            Ok(signer)
        }
    }
}

/// Interface from inline JSON or from a path to an ABI/artifact file.
pub async fn load_interface(source: &str) -> Result<Interface> {
    let trimmed = source.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        Ok(Interface::parse(source)?)
    } else {
        Interface::load(source)
            .await
            .map_err(|e| anyhow!("Failed to load interface from '{}': {}", source, e))
    }
}

/// A call request built from user-supplied strings, with the method it targets.
pub fn build_request<'a>(
    interface: &'a Interface,
    to: Address,
    method: &str,
    args: &Value,
) -> Result<(CallRequest, &'a Element)> {
    utils::validate_method_name(method)?;

    let function = interface.find_function(method).ok_or_else(|| {
        let available: Vec<&str> = interface.function_names().collect();
        anyhow!(
            "{} Available functions: {}",
            utils::describe_error(&Error::MethodNotFound(method.to_string())),
            available.join(", ")
        )
    })?;
    let args = value::args_from_json(&function.inputs, args)
        .map_err(|e| anyhow!("Invalid arguments for '{}': {}", function.signature(), e))?;

    Ok((CallRequest::new(to, method, args), function))
}

/// Applies user-supplied transaction options to a write request, then checks
/// the result against the target method and the write policy.
pub fn with_write_options(
    mut request: CallRequest,
    function: &Element,
    value: Option<&str>,
    gas_limit: Option<u64>,
    gas_price: Option<&str>,
    policy: &WritePolicy,
) -> Result<CallRequest> {
    if let Some(value) = value {
        request = request.with_value(utils::parse_amount(value)?);
    }
    if let Some(gas_limit) = gas_limit {
        request = request.with_gas_limit(gas_limit);
    }
    if let Some(gas_price) = gas_price {
        request = request.with_gas_price(utils::parse_gas_price(gas_price)?);
    }
    check_payable(function, request.value)?;
    policy.check(request.value)?;
    Ok(request)
}

/// Value sent to a non-payable method would revert on chain.
pub fn check_payable(function: &Element, value: Option<U256>) -> Result<()> {
    match value {
        Some(value) if !value.is_zero() && !function.is_payable() => Err(anyhow!(
            "Method '{}' is not payable but {} wei was attached",
            function.signature(),
            value
        )),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct ContractInvokerServer {
    invoker: Arc<DefaultInvoker>,
    policy: WritePolicy,
    shutdown: CancellationToken,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct InvokeMethodRequest {
    /// JSON ABI (array or build artifact) or a path to one
    abi: String,
    contract_address: String,
    method: String,
    /// Positional arguments as a JSON array
    args: Option<Value>,
    /// Wei, decimal or 0x hex
    value: Option<String>,
    gas_limit: Option<u64>,
    /// Wei, decimal or 0x hex
    gas_price: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct SignMessageRequest {
    message: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct VerifyMessageRequest {
    address: String,
    message: String,
    signature: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct AddressRequest {
    address: String,
}

impl ContractInvokerServer {
    pub fn new(invoker: DefaultInvoker, policy: WritePolicy) -> Self {
        Self {
            invoker: Arc::new(invoker),
            policy,
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn run(&self) -> Result<()> {
        info!("Starting Contract Invoker MCP Server");

        let service = self.clone().serve(stdio()).await?;

        info!("Contract Invoker MCP Server started successfully");
        let _ = service.waiting().await;
        // stop any receipt waits still in flight
        self.shutdown.cancel();
        Ok(())
    }

    async fn invoke(&self, request: InvokeMethodRequest) -> Result<CallResult> {
        let interface = load_interface(&request.abi).await?;
        let to = utils::validate_address(&request.contract_address)?;
        let args = request.args.unwrap_or(Value::Null);
        let (mut call, function) = build_request(&interface, to, &request.method, &args)?;

        if function.is_write_operation() {
            call = with_write_options(
                call,
                function,
                request.value.as_deref(),
                request.gas_limit,
                request.gas_price.as_deref(),
                &self.policy,
            )?;
        }

        let invocation = self
            .invoker
            .invoke(&interface, call, &self.shutdown)
            .await
            .map_err(|e| {
                if e.is_transport() {
                    warn!("Invocation of '{}' failed on the node: {}", request.method, e);
                }
                anyhow!(utils::describe_error(&e))
            })?;
        Ok(CallResult::from(&invocation))
    }
}

fn render<T: Serialize>(result: Result<T>, action: &str) -> String {
    match result {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| format!("Failed to serialize {} result", action)),
        Err(e) => {
            error!("Failed to {}: {}", action, e);
            format!("Error: {}", e)
        }
    }
}

#[tool(tool_box)]
impl ContractInvokerServer {
    #[tool(
        description = "Invoke a contract method. View and pure methods are answered with eth_call; other methods are signed, broadcast and awaited until mined."
    )]
    async fn invoke_method(&self, #[tool(aggr)] request: InvokeMethodRequest) -> String {
        render(self.invoke(request).await, "invoke method")
    }

    #[tool(description = "Sign a message (EIP-191 personal_sign) with the configured account")]
    async fn sign_message(&self, #[tool(aggr)] request: SignMessageRequest) -> String {
        let signer = self.invoker.signer();
        let result = signer
            .sign_message(&request.message)
            .map(|signature| {
                json!({
                    "address": signer.address().to_string(),
                    "signature": signature,
                })
            })
            .map_err(|e| anyhow!(utils::describe_error(&e)));
        render(result, "sign message")
    }

    #[tool(description = "Check that a personal_sign signature was produced by an address")]
    async fn verify_message(&self, #[tool(aggr)] request: VerifyMessageRequest) -> String {
        let result = utils::validate_address(&request.address).and_then(|address| {
            let (valid, recovered) = self
                .invoker
                .signer()
                .verify_message(address, &request.message, &request.signature)
                .map_err(|e| anyhow!(utils::describe_error(&e)))?;
            Ok(json!({
                "valid": valid,
                "recovered": recovered.to_string(),
            }))
        });
        render(result, "verify message")
    }

    #[tool(description = "Get the ETH balance of an address, in wei")]
    async fn get_balance(&self, #[tool(aggr)] request: AddressRequest) -> String {
        let result = async {
            let address = utils::validate_address(&request.address)?;
            let balance = self
                .invoker
                .transport()
                .get_balance(address)
                .await
                .map_err(|e| anyhow!(utils::describe_error(&e)))?;
            Ok::<_, anyhow::Error>(json!({
                "address": address.to_string(),
                "balance_wei": balance.to_string(),
            }))
        };
        render(result.await, "get balance")
    }

    #[tool(description = "Get the pending transaction count (next nonce) of an address")]
    async fn get_nonce(&self, #[tool(aggr)] request: AddressRequest) -> String {
        let result = async {
            let address = utils::validate_address(&request.address)?;
            let nonce = self
                .invoker
                .transport()
                .get_nonce(address)
                .await
                .map_err(|e| anyhow!(utils::describe_error(&e)))?;
            Ok::<_, anyhow::Error>(json!({
                "address": address.to_string(),
                "nonce": nonce,
            }))
        };
        render(result.await, "get nonce")
    }
}

#[tool(tool_box)]
impl ServerHandler for ContractInvokerServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("MCP server for invoking Ethereum smart contract methods with Alloy. Supports read-only calls, signed fee-market transactions with receipt tracking, personal message signing and verification, and balance and nonce queries.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
