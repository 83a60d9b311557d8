use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{eip191_hash_message, Address, PrimitiveSignature, TxKind, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use std::fmt;

use super::{SignedTransaction, UnsignedTransaction};
use crate::error::{Error, Result};

pub const SIGNATURE_LENGTH: usize = 65;

/// An account able to sign on behalf of one address.
pub trait AccountSigner: Send + Sync {
    fn address(&self) -> Address;

    /// Personal-message signature as `0x` + 130 hex characters, v in {0, 1}.
    fn sign_message(&self, message: &str) -> Result<String>;

    fn sign_transaction(&self, tx: &UnsignedTransaction) -> Result<SignedTransaction>;

    fn verify_message(
        &self,
        address: Address,
        message: &str,
        signature: &str,
    ) -> Result<(bool, Address)> {
        verify_message(address, message, signature)
    }
}

/// Private-key backed signer. The address is derived once, at construction.
pub struct LocalSigner {
    inner: PrivateKeySigner,
    address: Address,
}

impl LocalSigner {
    /// Accepts 64 hex characters with or without a `0x` prefix.
    pub fn from_hex(private_key: &str) -> Result<Self> {
        let private_key = private_key.trim();
        let hex_part = private_key
            .strip_prefix("0x")
            .or_else(|| private_key.strip_prefix("0X"))
            .unwrap_or(private_key);

        let bytes = hex::decode(hex_part)
            .map_err(|e| Error::InvalidKey(format!("not a hex string: {}", e)))?;
        if bytes.len() != 32 {
            return Err(Error::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }

        let inner = PrivateKeySigner::from_slice(&bytes)
            .map_err(|e| Error::InvalidKey(e.to_string()))?;
        Ok(Self::from_signer(inner))
    }

    pub fn random() -> Self {
        Self::from_signer(PrivateKeySigner::random())
    }

    fn from_signer(inner: PrivateKeySigner) -> Self {
        let address = inner.address();
        Self { inner, address }
    }
}

// do not log the key
impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish()
    }
}

impl AccountSigner for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_message(&self, message: &str) -> Result<String> {
        let hash = eip191_hash_message(message);
        let signature = self
            .inner
            .sign_hash_sync(&hash)
            .map_err(|e| Error::SigningFailed(Box::new(e)))?;
        let bytes = canonical_signature(signature.as_bytes());
        Ok(format!("0x{}", hex::encode(bytes)))
    }

    fn sign_transaction(&self, tx: &UnsignedTransaction) -> Result<SignedTransaction> {
        let chain_id = tx.chain_id.ok_or(Error::MissingChainId)?;

        let mut inner = TxEip1559 {
            chain_id,
            nonce: tx.nonce,
            gas_limit: tx.gas_limit,
            max_fee_per_gas: tx.max_fee_per_gas,
            max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
            to: tx.to.map(TxKind::Call).unwrap_or(TxKind::Create),
            value: tx.value,
            access_list: Default::default(),
            input: tx.input.clone(),
        };
        let signing_hash = inner.signature_hash();

        let signature = self
            .inner
            .sign_transaction_sync(&mut inner)
            .map_err(|e| Error::SigningFailed(Box::new(e)))?;
        let raw_signature = canonical_signature(signature.as_bytes());

        let envelope = TxEnvelope::Eip1559(inner.into_signed(signature));

        Ok(SignedTransaction {
            tx: tx.clone(),
            from: self.address,
            hash: *envelope.tx_hash(),
            signing_hash,
            signature: raw_signature,
            raw: envelope.encoded_2718().into(),
        })
    }
}

/// Recovers the signer of `message` and compares it with `address`.
///
/// A mismatch is `Ok((false, recovered))`. Only malformed signatures are errors.
pub fn verify_message(address: Address, message: &str, signature: &str) -> Result<(bool, Address)> {
    let signature = signature.trim();
    let hex_part = signature.strip_prefix("0x").unwrap_or(signature);
    let bytes = hex::decode(hex_part)
        .map_err(|e| Error::Decode(format!("signature is not valid hex: {}", e)))?;
    if bytes.len() != SIGNATURE_LENGTH {
        return Err(Error::Decode(format!(
            "signature must be {} bytes, got {}",
            SIGNATURE_LENGTH,
            bytes.len()
        )));
    }

    let recovered = recover_address(eip191_hash_message(message), &bytes)?;
    Ok((recovered == address, recovered))
}

/// Recovers the address behind a 65-byte r ‖ s ‖ v signature over `hash`.
/// v may be 0/1 or 27/28.
pub fn recover_address(hash: B256, signature: &[u8]) -> Result<Address> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(Error::Decode(format!(
            "signature must be {} bytes, got {}",
            SIGNATURE_LENGTH,
            signature.len()
        )));
    }

    let mut v = signature[64];
    if v >= 27 {
        v -= 27;
    }
    if v > 1 {
        return Err(Error::Decode(format!("invalid recovery id {}", signature[64])));
    }

    // high-s signatures are normalised before recovery, as ecrecover does
    PrimitiveSignature::from_bytes_and_parity(&signature[..64], v == 1)
        .recover_address_from_prehash(&hash)
        .map_err(|e| Error::Decode(format!("signature does not recover a public key: {}", e)))
}

/// Rewrites the trailing v byte to its y-parity (0 or 1).
fn canonical_signature(mut bytes: [u8; 65]) -> [u8; 65] {
    let v = bytes[64];
    bytes[64] = if v >= 27 { (v - 27) % 2 } else { v % 2 };
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use alloy::primitives::{address, keccak256, U256};

    // Hardhat account #0
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

    fn signer() -> LocalSigner {
        LocalSigner::from_hex(TEST_KEY).unwrap()
    }

    fn sample_tx() -> UnsignedTransaction {
        UnsignedTransaction {
            chain_id: Some(31337),
            nonce: 7,
            max_priority_fee_per_gas: 1_000_000_000,
            max_fee_per_gas: 2_000_000_000,
            gas_limit: 21_000,
            to: Some(Address::repeat_byte(0x22)),
            value: U256::from(1_000u64),
            input: vec![0xa9, 0x05, 0x9c, 0xbb].into(),
        }
    }

    #[test]
    fn test_address_derivation() {
        assert_eq!(signer().address(), TEST_ADDRESS);
        let unprefixed = LocalSigner::from_hex(&TEST_KEY[2..]).unwrap();
        assert_eq!(unprefixed.address(), TEST_ADDRESS);
        let padded = LocalSigner::from_hex(&format!("  {}\n", TEST_KEY)).unwrap();
        assert_eq!(padded.address(), TEST_ADDRESS);
    }

    #[test]
    fn test_invalid_keys() {
        let zero = "00".repeat(32);
        for key in ["", "0x1234", "not-a-key", zero.as_str()] {
            let err = LocalSigner::from_hex(key).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidKey, "key {:?}", key);
        }
    }

    #[test]
    fn test_debug_hides_key() {
        let debug = format!("{:?}", signer());
        assert!(!debug.contains(&TEST_KEY[2..]));
        assert!(debug.contains("address"));
    }

    #[test]
    fn test_signature_length() {
        let signer = signer();
        let long = "x".repeat(10_000);
        for message in ["", "hello", long.as_str()] {
            let signature = signer.sign_message(message).unwrap();
            assert_eq!(signature.len(), 132);
            assert!(signature.starts_with("0x"));
            let v = u8::from_str_radix(&signature[130..], 16).unwrap();
            assert!(v <= 1);
        }
    }

    #[test]
    fn test_sign_message_is_deterministic() {
        let signer = signer();
        assert_eq!(
            signer.sign_message("hello").unwrap(),
            signer.sign_message("hello").unwrap()
        );
    }

    #[test]
    fn test_verify_own_signature() {
        let signer = signer();
        let signature = signer.sign_message("hello").unwrap();

        let (valid, recovered) = signer.verify_message(TEST_ADDRESS, "hello", &signature).unwrap();
        assert!(valid);
        assert_eq!(recovered, TEST_ADDRESS);

        let other = Address::repeat_byte(0x42);
        let (valid, recovered) = verify_message(other, "hello", &signature).unwrap();
        assert!(!valid);
        assert_eq!(recovered, TEST_ADDRESS);

        let (valid, recovered) = verify_message(TEST_ADDRESS, "hellO", &signature).unwrap();
        assert!(!valid);
        assert_ne!(recovered, TEST_ADDRESS);
    }

    #[test]
    fn test_verify_accepts_all_v_and_prefix_forms() {
        let signature = signer().sign_message("gm").unwrap();
        let body = &signature[2..];
        let v = u8::from_str_radix(&body[128..], 16).unwrap();
        let legacy_body = format!("{}{:02x}", &body[..128], v + 27);

        for form in [
            signature.clone(),
            body.to_string(),
            format!("0x{}", legacy_body),
            legacy_body.clone(),
        ] {
            let (valid, recovered) = verify_message(TEST_ADDRESS, "gm", &form).unwrap();
            assert!(valid, "form {}", form);
            assert_eq!(recovered, TEST_ADDRESS);
        }
    }

    #[test]
    fn test_verify_rejects_malformed_signatures() {
        let signature = signer().sign_message("gm").unwrap();
        let bad_v = format!("{}05", &signature[..130]);
        let too_long = format!("{}00", signature);
        for bad in [
            &signature[..130],
            too_long.as_str(),
            "0x",
            "0xzz",
            "not hex at all",
            bad_v.as_str(),
        ] {
            let err = verify_message(TEST_ADDRESS, "gm", bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Decode, "signature {:?}", bad);
        }
    }

    #[test]
    fn test_verify_accepts_high_s_form() {
        // secp256k1 group order
        let order = U256::from_str_radix(
            "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141",
            16,
        )
        .unwrap();
        let signature = signer().sign_message("gm").unwrap();
        let mut bytes = hex::decode(&signature[2..]).unwrap();

        let s = U256::from_be_slice(&bytes[32..64]);
        let high_s = order - s;
        assert!(high_s > order >> 1);
        bytes[32..64].copy_from_slice(&high_s.to_be_bytes::<32>());
        bytes[64] ^= 1;

        let malleated = format!("0x{}", hex::encode(&bytes));
        assert_ne!(malleated, signature);
        let (valid, recovered) = verify_message(TEST_ADDRESS, "gm", &malleated).unwrap();
        assert!(valid);
        assert_eq!(recovered, TEST_ADDRESS);
    }

    #[test]
    fn test_sign_transaction() {
        let signer = signer();
        let signed = signer.sign_transaction(&sample_tx()).unwrap();

        assert_eq!(signed.from, TEST_ADDRESS);
        assert_eq!(signed.signature.len(), SIGNATURE_LENGTH);
        assert!(signed.signature[64] <= 1);
        // EIP-2718 type byte for EIP-1559
        assert_eq!(signed.raw[0], 0x02);
        assert_eq!(signed.hash, keccak256(&signed.raw));
        assert_eq!(
            recover_address(signed.signing_hash, &signed.signature).unwrap(),
            TEST_ADDRESS
        );
    }

    #[test]
    fn test_sign_transaction_is_deterministic() {
        let signer = signer();
        let a = signer.sign_transaction(&sample_tx()).unwrap();
        let b = signer.sign_transaction(&sample_tx()).unwrap();
        assert_eq!(a, b);

        let mut bumped = sample_tx();
        bumped.nonce += 1;
        assert_ne!(signer.sign_transaction(&bumped).unwrap().hash, a.hash);
    }

    #[test]
    fn test_contract_creation_transaction() {
        let mut tx = sample_tx();
        tx.to = None;
        let signed = signer().sign_transaction(&tx).unwrap();
        assert_eq!(signed.tx.to, None);
    }

    #[test]
    fn test_missing_chain_id() {
        let mut tx = sample_tx();
        tx.chain_id = None;
        let err = signer().sign_transaction(&tx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingChainId);
    }
}
