use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Constructor, Function, JsonAbi, Param, StateMutability};
use alloy::primitives::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use tokio::fs;
use tracing::debug;

use super::value::{self, AbiValue};
use crate::error::{Error, Result};

/// A callable interface entry.
pub type Element = Function;

/// Mutability predicates and typed encoding over an interface function.
pub trait ElementExt {
    fn is_read_only(&self) -> bool;

    fn is_write_operation(&self) -> bool {
        !self.is_read_only()
    }

    fn is_payable(&self) -> bool;

    /// Selector followed by the ABI-encoded arguments.
    fn encode_input(&self, args: &[AbiValue]) -> Result<Bytes>;

    fn decode_output(&self, data: &[u8]) -> Result<Vec<AbiValue>>;
}

impl ElementExt for Function {
    fn is_read_only(&self) -> bool {
        matches!(
            self.state_mutability,
            StateMutability::Pure | StateMutability::View
        )
    }

    fn is_payable(&self) -> bool {
        self.state_mutability == StateMutability::Payable
    }

    fn encode_input(&self, args: &[AbiValue]) -> Result<Bytes> {
        let values = pack(&self.name, &self.inputs, args)?;
        self.abi_encode_input(&values)
            .map(Bytes::from)
            .map_err(|e| Error::PackFailed {
                method: self.name.clone(),
                reason: e.to_string(),
            })
    }

    fn decode_output(&self, data: &[u8]) -> Result<Vec<AbiValue>> {
        if self.outputs.is_empty() {
            return Ok(Vec::new());
        }
        self.abi_decode_output(data, false)
            .map(|values| values.into_iter().map(AbiValue::from_dyn).collect())
            .map_err(|e| Error::UnpackFailed {
                method: self.name.clone(),
                reason: e.to_string(),
            })
    }
}

/// ABI-encoded constructor arguments, without a selector, as appended to
/// creation code.
pub fn encode_constructor(constructor: &Constructor, args: &[AbiValue]) -> Result<Vec<u8>> {
    let values = pack("constructor", &constructor.inputs, args)?;
    constructor
        .abi_encode_input(&values)
        .map_err(|e| Error::PackFailed {
            method: "constructor".to_string(),
            reason: e.to_string(),
        })
}

fn pack(method: &str, params: &[Param], args: &[AbiValue]) -> Result<Vec<DynSolValue>> {
    value::to_dyn_values(params, args).map_err(|reason| Error::PackFailed {
        method: method.to_string(),
        reason,
    })
}

/// A contract's callable surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Interface {
    abi: JsonAbi,
}

#[derive(Deserialize)]
struct ArtifactJson {
    abi: Value,
    #[serde(default)]
    bytecode: Option<BytecodeJson>,
}

/// Hardhat writes bytecode as a string, Foundry as `{ "object": "0x..." }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum BytecodeJson {
    Hex(String),
    Object { object: String },
}

/// Build output: interface plus creation bytecode, when present.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub interface: Interface,
    pub bytecode: Option<Bytes>,
}

impl Interface {
    /// Parse a bare ABI array, or an artifact object carrying an `abi` array.
    pub fn parse(text: &str) -> Result<Self> {
        let (abi, _) = parse_document(text)?;
        Ok(Self { abi })
    }

    /// Like [`Interface::parse`], keeping the creation bytecode.
    pub fn parse_artifact(text: &str) -> Result<Artifact> {
        let (abi, bytecode) = parse_document(text)?;
        let bytecode = match bytecode {
            Some(BytecodeJson::Hex(code)) | Some(BytecodeJson::Object { object: code }) => {
                decode_bytecode(&code)?
            }
            None => None,
        };

        Ok(Artifact {
            interface: Self { abi },
            bytecode,
        })
    }

    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = read_interface_file(path.as_ref()).await?;
        Self::parse(&text)
    }

    pub async fn load_artifact<P: AsRef<Path>>(path: P) -> Result<Artifact> {
        let text = read_interface_file(path.as_ref()).await?;
        Self::parse_artifact(&text)
    }

    /// First function named `name`, in declaration order. Overloads are not
    /// disambiguated.
    pub fn find_function(&self, name: &str) -> Option<&Element> {
        self.abi
            .function(name)
            .and_then(|overloads| overloads.first())
    }

    /// Distinct function names, sorted.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.abi.functions.keys().map(String::as_str)
    }

    pub fn constructor(&self) -> Option<&Constructor> {
        self.abi.constructor()
    }
}

fn parse_document(text: &str) -> Result<(JsonAbi, Option<BytecodeJson>)> {
    let document: Value = serde_json::from_str(text).map_err(|e| Error::Parse {
        reason: format!("interface is not valid JSON: {}", e),
        source: Some(Box::new(e)),
    })?;

    let (mut abi, bytecode) = match document {
        array @ Value::Array(_) => (array, None),
        object => {
            debug!("Interface is not a bare ABI array, trying artifact form");
            let artifact: ArtifactJson = serde_json::from_value(object).map_err(|e| Error::Parse {
                reason: format!("expected an ABI array or an object with an `abi` field: {}", e),
                source: Some(Box::new(e)),
            })?;
            (artifact.abi, artifact.bytecode)
        }
    };

    // entries without a type are functions
    if let Value::Array(items) = &mut abi {
        for fields in items.iter_mut().filter_map(Value::as_object_mut) {
            fields
                .entry("type")
                .or_insert_with(|| Value::from("function"));
        }
    }

    let abi = serde_json::from_value(abi).map_err(|e| Error::Parse {
        reason: format!("invalid ABI: {}", e),
        source: Some(Box::new(e)),
    })?;
    Ok((abi, bytecode))
}

fn decode_bytecode(code: &str) -> Result<Option<Bytes>> {
    let code = code.trim();
    let hex_part = code.strip_prefix("0x").unwrap_or(code);
    if hex_part.is_empty() {
        return Ok(None);
    }
    hex::decode(hex_part)
        .map(|bytes| Some(bytes.into()))
        .map_err(|e| Error::Parse {
            reason: format!("artifact bytecode is not valid hex: {}", e),
            source: Some(Box::new(e)),
        })
}

async fn read_interface_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).await.map_err(|e| Error::Parse {
        reason: format!("failed to read interface file {:?}", path),
        source: Some(Box::new(e)),
    })
}
