use ledger_core::model::FormulaTree;
use ledger_core::types::{Address32, PublicKey};
use pqcrypto_dilithium::dilithium2;
use pqcrypto_traits::sign::{PublicKey as _, SecretKey as _};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::hash::address_from_definition;

/// A Dilithium2 keypair bound to a single-signature address definition.
///
/// The secret key is held as plain bytes and wiped on drop; callers needing
/// to hand the key to `sign` clone it into a `Zeroizing` buffer first.
#[derive(Serialize, Deserialize)]
pub struct KeyPair {
    pub address: Address32,
    pub public_key: PublicKey,
    secret_key: Vec<u8>,
}

fn single_sig_definition(pk: &PublicKey) -> FormulaTree {
    use base64::Engine;
    let pubkey_b64 = base64::engine::general_purpose::STANDARD.encode(&pk.0);
    serde_json::json!(["sig", {"pubkey": pubkey_b64}])
}

impl KeyPair {
    /// Generate a fresh Dilithium2 keypair bound to a single-sig address.
    pub fn generate() -> Self {
        let (pk, sk) = dilithium2::keypair();
        let public_key = PublicKey(pk.as_bytes().to_vec());
        let address = address_from_definition(&single_sig_definition(&public_key));
        Self {
            address,
            public_key,
            secret_key: sk.as_bytes().to_vec(),
        }
    }

    /// The single-sig definition tree bound to this keypair's address.
    pub fn definition(&self) -> FormulaTree {
        single_sig_definition(&self.public_key)
    }

    pub fn sign(&self, message: &[u8]) -> ledger_core::types::Signature {
        let sk = Zeroizing::new(self.secret_key.clone());
        crate::dilithium::sign(&sk, message).expect("sign with valid secret key is infallible")
    }

    pub fn secret_key_bytes(&self) -> &[u8] {
        &self.secret_key
    }

    pub fn from_raw(pk_bytes: Vec<u8>, sk_bytes: Vec<u8>) -> Self {
        let public_key = PublicKey(pk_bytes);
        let address = address_from_definition(&single_sig_definition(&public_key));
        Self {
            address,
            public_key,
            secret_key: sk_bytes,
        }
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.secret_key.zeroize();
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ address: {:?} }}", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keypair_address_matches_definition() {
        let kp = KeyPair::generate();
        assert_eq!(address_from_definition(&kp.definition()), kp.address);
    }
}
