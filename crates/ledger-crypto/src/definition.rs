//! Evaluates an author's definition predicate tree against the
//! `authentifiers` path → signature map carried on the unit.
//!
//! Supported predicates: `["sig", {"pubkey": ...}]`, `["and", [..]]`,
//! `["or", [..]]`, `["r of set", {"required": n, "set": [..]}]`. Each leaf's
//! signature is looked up by its dotted path within the tree (`"r"` for a
//! bare signature, `"r.0"`, `"r.1.2"`, ... for composite trees), mirroring
//! how the wire-level `authentifiers` map is keyed.

use std::collections::BTreeMap;

use ledger_core::model::FormulaTree;
use ledger_core::types::{PublicKey, Signature};
use thiserror::Error;

use crate::dilithium::verify_signature;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("malformed definition node: {0}")]
    Malformed(String),
    #[error("missing signature at path {0}")]
    MissingSignature(String),
    #[error("invalid base64 in definition or authentifier at path {0}")]
    BadEncoding(String),
    #[error("signature verification failed at path {0}")]
    BadSignature(String),
    #[error("'r of set' requires {required} of {total}, but only {total} children supplied")]
    RequiredExceedsSet { required: u64, total: usize },
}

fn decode_b64(s: &str, path: &str) -> Result<Vec<u8>, DefinitionError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|_| DefinitionError::BadEncoding(path.to_string()))
}

/// Evaluates `tree` at `path` against `authentifiers`, verifying every leaf
/// `sig` predicate over `message` (the unit hash bytes). Returns `Ok(true)`
/// only if the whole predicate tree is satisfied.
pub fn evaluate_definition(
    tree: &FormulaTree,
    path: &str,
    authentifiers: &BTreeMap<String, String>,
    message: &[u8],
) -> Result<bool, DefinitionError> {
    let arr = tree
        .as_array()
        .filter(|a| a.len() == 2)
        .ok_or_else(|| DefinitionError::Malformed(path.to_string()))?;
    let op = arr[0]
        .as_str()
        .ok_or_else(|| DefinitionError::Malformed(path.to_string()))?;

    match op {
        "sig" => {
            let pubkey_b64 = arr[1]
                .get("pubkey")
                .and_then(|v| v.as_str())
                .ok_or_else(|| DefinitionError::Malformed(path.to_string()))?;
            let pubkey = PublicKey(decode_b64(pubkey_b64, path)?);
            let sig_b64 = authentifiers
                .get(path)
                .ok_or_else(|| DefinitionError::MissingSignature(path.to_string()))?;
            let sig = Signature(decode_b64(sig_b64, path)?);
            verify_signature(&pubkey, message, &sig)
                .map(|_| true)
                .map_err(|_| DefinitionError::BadSignature(path.to_string()))
        }
        "and" => {
            let children = arr[1]
                .as_array()
                .ok_or_else(|| DefinitionError::Malformed(path.to_string()))?;
            for (i, child) in children.iter().enumerate() {
                let child_path = format!("{path}.{i}");
                if !evaluate_definition(child, &child_path, authentifiers, message)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        "or" => {
            let children = arr[1]
                .as_array()
                .ok_or_else(|| DefinitionError::Malformed(path.to_string()))?;
            for (i, child) in children.iter().enumerate() {
                let child_path = format!("{path}.{i}");
                if evaluate_definition(child, &child_path, authentifiers, message)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        "r of set" => {
            let required = arr[1]
                .get("required")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| DefinitionError::Malformed(path.to_string()))?;
            let set = arr[1]
                .get("set")
                .and_then(|v| v.as_array())
                .ok_or_else(|| DefinitionError::Malformed(path.to_string()))?;
            if required as usize > set.len() {
                return Err(DefinitionError::RequiredExceedsSet {
                    required,
                    total: set.len(),
                });
            }
            let mut satisfied = 0u64;
            for (i, child) in set.iter().enumerate() {
                let child_path = format!("{path}.{i}");
                if evaluate_definition(child, &child_path, authentifiers, message)? {
                    satisfied += 1;
                }
            }
            Ok(satisfied >= required)
        }
        other => Err(DefinitionError::Malformed(format!(
            "unknown op '{other}' at {path}"
        ))),
    }
}

/// Entry point used by the validator: evaluates the author's definition tree
/// rooted at path `"r"`.
pub fn verify_author(
    definition: &FormulaTree,
    authentifiers: &BTreeMap<String, String>,
    message: &[u8],
) -> Result<bool, DefinitionError> {
    evaluate_definition(definition, "r", authentifiers, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dilithium::LedgerSigner;
    use pqcrypto_dilithium::dilithium2;
    use pqcrypto_traits::sign::PublicKey as _;

    fn b64(bytes: &[u8]) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn single_sig_verifies() {
        let (pk, sk) = dilithium2::keypair();
        let signer =
            LedgerSigner::from_secret_key_bytes(sk.as_bytes().to_vec(), pk.as_bytes().to_vec());
        let msg = b"hash-of-unit";
        let sig = signer.sign(msg).unwrap();

        let tree = serde_json::json!(["sig", {"pubkey": b64(pk.as_bytes())}]);
        let mut auth = BTreeMap::new();
        auth.insert("r".to_string(), b64(&sig.0));

        assert!(verify_author(&tree, &auth, msg).unwrap());
    }

    #[test]
    fn r_of_set_requires_threshold() {
        let (pk1, sk1) = dilithium2::keypair();
        let (pk2, _sk2) = dilithium2::keypair();
        let (pk3, sk3) = dilithium2::keypair();
        let msg = b"hash-of-unit";

        let signer1 =
            LedgerSigner::from_secret_key_bytes(sk1.as_bytes().to_vec(), pk1.as_bytes().to_vec());
        let signer3 =
            LedgerSigner::from_secret_key_bytes(sk3.as_bytes().to_vec(), pk3.as_bytes().to_vec());

        let tree = serde_json::json!(["r of set", {
            "required": 2,
            "set": [
                ["sig", {"pubkey": b64(pk1.as_bytes())}],
                ["sig", {"pubkey": b64(pk2.as_bytes())}],
                ["sig", {"pubkey": b64(pk3.as_bytes())}],
            ]
        }]);

        let mut auth = BTreeMap::new();
        auth.insert("r.0".to_string(), b64(&signer1.sign(msg).unwrap().0));
        auth.insert("r.2".to_string(), b64(&signer3.sign(msg).unwrap().0));
        // no "r.1" entry — pk2 did not sign.

        assert!(verify_author(&tree, &auth, msg).unwrap());
    }

    #[test]
    fn r_of_set_rejects_below_threshold() {
        let (pk1, sk1) = dilithium2::keypair();
        let (pk2, _sk2) = dilithium2::keypair();
        let msg = b"hash-of-unit";
        let signer1 =
            LedgerSigner::from_secret_key_bytes(sk1.as_bytes().to_vec(), pk1.as_bytes().to_vec());

        let tree = serde_json::json!(["r of set", {
            "required": 2,
            "set": [
                ["sig", {"pubkey": b64(pk1.as_bytes())}],
                ["sig", {"pubkey": b64(pk2.as_bytes())}],
            ]
        }]);
        let mut auth = BTreeMap::new();
        auth.insert("r.0".to_string(), b64(&signer1.sign(msg).unwrap().0));

        assert!(!verify_author(&tree, &auth, msg).unwrap());
    }
}
