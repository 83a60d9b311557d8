use alloy::primitives::{Address, U256};
use anyhow::{anyhow, Result};
use std::error::Error as StdError;
use std::str::FromStr;

use crate::error::{Error, ErrorKind};

/// Validates and normalizes an Ethereum address
pub fn validate_address(address: &str) -> Result<Address> {
    let address = address.trim();

    if address.is_empty() {
        return Err(anyhow!("Address cannot be empty"));
    }

    if !address.starts_with("0x") && !address.starts_with("0X") {
        return Err(anyhow!(
            "Invalid address format: '{}'. Ethereum addresses must start with '0x'",
            address
        ));
    }

    if address.len() != 42 {
        return Err(anyhow!(
            "Invalid address length: '{}'. Ethereum addresses must be exactly 42 characters (0x + 40 hex characters)",
            address
        ));
    }

    let hex_part = &address[2..];
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!(
            "Invalid address format: '{}'. Contains non-hexadecimal characters",
            address
        ));
    }

    Address::from_str(address)
        .map_err(|e| anyhow!("Invalid Ethereum address: '{}'. Error: {}", address, e))
}

/// Checks that `network` is one of the configured network names
pub fn validate_network(network: &str, available_networks: &[String]) -> Result<()> {
    if network.is_empty() {
        return Err(anyhow!("Network name cannot be empty"));
    }

    if !available_networks.iter().any(|n| n == network) {
        return Err(anyhow!(
            "Unknown network: '{}'. Available networks: {}",
            network,
            available_networks.join(", ")
        ));
    }

    Ok(())
}

/// Method names must be plain Solidity identifiers
pub fn validate_method_name(method: &str) -> Result<()> {
    let mut chars = method.chars();
    let first = chars
        .next()
        .ok_or_else(|| anyhow!("Method name cannot be empty"))?;

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(anyhow!(
            "Invalid method name: '{}'. Method names must start with a letter or underscore",
            method
        ));
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(anyhow!(
            "Invalid method name: '{}'. Method names can only contain letters, numbers, and underscores",
            method
        ));
    }

    Ok(())
}

/// Parses a wei amount given in decimal or `0x` hex
pub fn parse_amount(value_str: &str) -> Result<U256> {
    let value_str = value_str.trim();
    if value_str.is_empty() {
        return Err(anyhow!("Value cannot be empty"));
    }

    if let Some(hex_part) = value_str
        .strip_prefix("0x")
        .or_else(|| value_str.strip_prefix("0X"))
    {
        U256::from_str_radix(hex_part, 16)
            .map_err(|_| anyhow!("Invalid hexadecimal value: '{}'", value_str))
    } else {
        U256::from_str_radix(value_str, 10).map_err(|_| {
            anyhow!(
                "Invalid numeric value: '{}'. Use decimal format or '0x' prefixed hex",
                value_str
            )
        })
    }
}

/// Gas price in wei; must fit the fee fields of a transaction
pub fn parse_gas_price(value_str: &str) -> Result<u128> {
    let value = parse_amount(value_str)?;
    u128::try_from(value).map_err(|_| anyhow!("Gas price too large: '{}'", value_str))
}

/// User-facing message for an invocation failure, with a hint where one helps
pub fn describe_error(error: &Error) -> String {
    match error.kind() {
        ErrorKind::MethodNotFound => format!(
            "{}. Check the method name against the contract interface.",
            error
        ),
        ErrorKind::Connection => format!(
            "Network error: {}. Check your internet connection and RPC URL configuration.",
            error_chain(error)
        ),
        ErrorKind::CallFailed
        | ErrorKind::EstimateFailed
        | ErrorKind::SendFailed
        | ErrorKind::BalanceQueryFailed
        | ErrorKind::NonceQueryFailed
        | ErrorKind::ChainIdQueryFailed
        | ErrorKind::ReceiptQueryFailed => interpret_rpc_error(&error_chain(error)),
        ErrorKind::ReceiptTimeout => format!(
            "{}. The transaction may still be mined; look it up by hash before resending.",
            error
        ),
        ErrorKind::InvalidKey => format!(
            "{}. Private keys are 32 bytes of hex, with or without a 0x prefix.",
            error
        ),
        _ => error_chain(error),
    }
}

fn error_chain(error: &Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Creates user-friendly error messages for common RPC errors
pub fn interpret_rpc_error(error: &str) -> String {
    if error.contains("execution reverted") {
        format!(
            "Transaction failed: The contract function reverted execution. This usually means the function's requirements were not met or an assertion failed. ({})",
            error
        )
    } else if error.contains("insufficient funds") {
        "Transaction failed: Insufficient funds to cover gas costs. Make sure your account has enough ETH for gas fees.".to_string()
    } else if error.contains("gas required exceeds allowance") {
        "Transaction failed: Gas limit too low. Try increasing the gas limit for this transaction."
            .to_string()
    } else if error.contains("nonce too low") {
        "Transaction failed: Nonce too low. This usually means another transaction was already mined with this nonce.".to_string()
    } else if error.contains("replacement transaction underpriced") {
        "Transaction failed: Gas price too low to replace pending transaction. Increase the gas price.".to_string()
    } else if error.contains("connection refused") || error.contains("network unreachable") {
        "Network error: Cannot connect to RPC endpoint. Check your internet connection and RPC URL configuration.".to_string()
    } else if error.contains("timeout") || error.contains("timed out") {
        "Network error: Request timed out. The RPC endpoint may be overloaded or unreachable."
            .to_string()
    } else if error.contains("rate limit") {
        "Rate limit error: Too many requests to the RPC endpoint. Try again in a few moments or use a different endpoint.".to_string()
    } else if error.contains("method not found") {
        "RPC error: The requested method is not supported by this RPC endpoint. Try using a different endpoint.".to_string()
    } else {
        format!("RPC error: {}", error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;
    use std::time::Duration;

    #[test]
    fn test_validate_address() {
        // Valid addresses
        assert!(validate_address("0x742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_ok());
        assert!(validate_address("0x0000000000000000000000000000000000000000").is_ok());

        // Invalid addresses
        assert!(validate_address("").is_err());
        assert!(validate_address("not_an_address").is_err());
        assert!(validate_address("0x123").is_err()); // Too short
        assert!(validate_address("742d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_err()); // Missing 0x
        assert!(validate_address("0xgg2d35Cc6435C9c1c72c5E7b18BaB7e1DB7a5d6e").is_err());
    }

    #[test]
    fn test_validate_network() {
        let networks = vec!["ethereum".to_string(), "sepolia".to_string()];

        assert!(validate_network("ethereum", &networks).is_ok());
        assert!(validate_network("sepolia", &networks).is_ok());
        assert!(validate_network("invalid", &networks).is_err());
        assert!(validate_network("", &networks).is_err());
    }

    #[test]
    fn test_validate_method_name() {
        assert!(validate_method_name("transfer").is_ok());
        assert!(validate_method_name("_internal").is_ok());
        assert!(validate_method_name("getBalance123").is_ok());

        assert!(validate_method_name("").is_err());
        assert!(validate_method_name("123invalid").is_err());
        assert!(validate_method_name("invalid-name").is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1000").unwrap(), U256::from(1000));
        assert_eq!(parse_amount("0x3e8").unwrap(), U256::from(1000));
        assert_eq!(parse_amount(" 0X10 ").unwrap(), U256::from(16));

        assert!(parse_amount("").is_err());
        assert!(parse_amount("1.5").is_err());
        assert!(parse_amount("0xzz").is_err());
    }

    #[test]
    fn test_parse_gas_price_bounds() {
        assert_eq!(parse_gas_price("1000000000").unwrap(), 1_000_000_000);
        assert!(parse_gas_price(&format!("0x{}", "f".repeat(40))).is_err());
    }

    #[test]
    fn test_describe_error_includes_cause() {
        let err = Error::EstimateFailed("insufficient funds for gas * price + value".into());
        assert!(describe_error(&err).contains("Insufficient funds"));

        let err = Error::SendFailed("server returned something odd".into());
        assert!(describe_error(&err).contains("something odd"));

        let err = Error::ReceiptTimeout {
            hash: B256::ZERO,
            waited: Duration::from_secs(300),
        };
        assert!(describe_error(&err).contains("look it up by hash"));

        let err = Error::MethodNotFound("mint".to_string());
        assert!(describe_error(&err).contains("mint"));
    }
}
