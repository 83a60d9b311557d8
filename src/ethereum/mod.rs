pub mod abi;
pub mod contract;
pub mod provider;
pub mod signer;
pub mod utils;
pub mod value;

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use value::AbiValue;

/// A fee-market transaction before signing. `to == None` creates a contract.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnsignedTransaction {
    pub chain_id: Option<u64>,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
}

/// A signed EIP-1559 transaction, ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx: UnsignedTransaction,
    pub from: Address,
    pub hash: B256,
    /// Digest the signature was produced over.
    pub signing_hash: B256,
    /// r ‖ s ‖ v with v in {0, 1}.
    pub signature: [u8; 65],
    /// EIP-2718 envelope bytes.
    pub raw: Bytes,
}

#[derive(Debug, Clone)]
pub struct CallRequest {
    pub to: Address,
    pub method: String,
    pub args: Vec<AbiValue>,
    pub value: Option<U256>,
    /// 0 asks for an estimate.
    pub gas_limit: u64,
    /// Wei. Falls back to the configured minimum.
    pub gas_price: Option<u128>,
}

impl CallRequest {
    pub fn new(to: Address, method: impl Into<String>, args: Vec<AbiValue>) -> Self {
        Self {
            to,
            method: method.into(),
            args,
            value: None,
            gas_limit: 0,
            gas_price: None,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(gas_price);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: B256,
    pub status: bool,
    pub gas_used: u64,
    pub block_number: Option<u64>,
    pub contract_address: Option<Address>,
}

/// Outcome of a dispatched method call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Read(Vec<AbiValue>),
    Write { status: bool, tx_hash: String, receipt: Receipt },
}

/// Serializable summary of an invocation, as returned by the CLI and the tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResult {
    pub success: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub gas_used: Option<u64>,
    pub transaction_hash: Option<String>,
    pub block_number: Option<u64>,
    pub contract_address: Option<String>,
}

impl From<&Invocation> for CallResult {
    fn from(invocation: &Invocation) -> Self {
        match invocation {
            Invocation::Read(values) => CallResult {
                success: true,
                result: Some(value::values_to_json(values)),
                error: None,
                gas_used: None,
                transaction_hash: None,
                block_number: None,
                contract_address: None,
            },
            Invocation::Write {
                status,
                tx_hash,
                receipt,
            } => CallResult {
                success: *status,
                result: None,
                error: (!status).then(|| "transaction reverted".to_string()),
                gas_used: Some(receipt.gas_used),
                transaction_hash: Some(tx_hash.clone()),
                block_number: receipt.block_number,
                contract_address: receipt.contract_address.map(|a| a.to_string()),
            },
        }
    }
}

impl From<&Receipt> for CallResult {
    fn from(receipt: &Receipt) -> Self {
        CallResult {
            success: receipt.status,
            result: None,
            error: (!receipt.status).then(|| "transaction reverted".to_string()),
            gas_used: Some(receipt.gas_used),
            transaction_hash: Some(format!("{:#x}", receipt.transaction_hash)),
            block_number: receipt.block_number,
            contract_address: receipt.contract_address.map(|a| a.to_string()),
        }
    }
}
