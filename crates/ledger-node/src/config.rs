//! CLI arguments and environment validation.
//!
//! Grounded on the teacher's `main.rs` `Args` struct, with one deliberate
//! divergence: the teacher's `data_dir` defaulted to `"~/.chronx/data"` and
//! silently expanded the `~` itself. spec.md §6 requires environment
//! problems to fail loudly rather than be papered over with a fallback, so
//! `--data-dir` here is required, and `validate_data_dir` rejects anything
//! that isn't an absolute, non-empty path instead of rewriting it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use ledger_core::constants::COUNT_WITNESSES;
use ledger_core::types::Address32;
use ledger_genesis::GenesisParams;

#[derive(Parser, Debug)]
#[command(name = "ledger-node", about = "Witness-based DAG ledger node")]
pub struct Args {
    /// Absolute path to the node's sled data directory. Must already exist
    /// or be creatable; never silently rewritten or defaulted.
    #[arg(long)]
    pub data_dir: PathBuf,

    /// Network tag this node only accepts units for (`Unit::alt`).
    #[arg(long, default_value = "1")]
    pub alt: String,

    /// Address the JSON-RPC server binds to.
    #[arg(long, default_value = "127.0.0.1:6050")]
    pub rpc_addr: SocketAddr,

    /// Path to a JSON-encoded `GenesisParams`. If omitted on a fresh data
    /// directory, an ephemeral devnet genesis is generated and its witness
    /// keys are logged once (and only once) at startup — there is no way
    /// to recover them afterward.
    #[arg(long)]
    pub genesis_params: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("--data-dir must not be empty")]
    DataDirEmpty,
    #[error("--data-dir must be an absolute path, got {0:?}")]
    DataDirNotAbsolute(PathBuf),
    #[error("failed to read genesis params file {path:?}: {source}")]
    GenesisFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse genesis params file {path:?}: {source}")]
    GenesisFileParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Fails loudly on anything unusable instead of rewriting the path: no
/// tilde expansion, no falling back to a relative directory.
pub fn validate_data_dir(path: &Path) -> Result<(), ConfigError> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::DataDirEmpty);
    }
    if !path.is_absolute() {
        return Err(ConfigError::DataDirNotAbsolute(path.to_path_buf()));
    }
    Ok(())
}

pub fn load_genesis_params(path: &Path) -> Result<GenesisParams, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::GenesisFileRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::GenesisFileParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Generates `COUNT_WITNESSES` ephemeral keypairs for a from-scratch devnet,
/// sorted ascending by address (the invariant `apply_genesis` enforces on
/// `params.witnesses`). Returns the keys alongside the params so a caller
/// can log or discard them; production deployments always pass
/// `--genesis-params` instead.
pub fn generate_ephemeral_genesis(alt: String) -> (GenesisParams, Vec<ledger_crypto::KeyPair>) {
    let mut keys: Vec<ledger_crypto::KeyPair> = (0..COUNT_WITNESSES)
        .map(|_| ledger_crypto::KeyPair::generate())
        .collect();
    keys.sort_by(|a, b| a.address.cmp(&b.address));
    let witnesses: Vec<Address32> = keys.iter().map(|k| k.address.clone()).collect();
    let initial_allocation = witnesses.iter().map(|w| (w.clone(), 1_000_000u64)).collect();
    (
        GenesisParams {
            alt,
            witnesses,
            initial_allocation,
        },
        keys,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_data_dir() {
        let err = validate_data_dir(Path::new("relative/path")).unwrap_err();
        assert!(matches!(err, ConfigError::DataDirNotAbsolute(_)));
    }

    #[test]
    fn rejects_empty_data_dir() {
        let err = validate_data_dir(Path::new("")).unwrap_err();
        assert!(matches!(err, ConfigError::DataDirEmpty));
    }

    #[test]
    fn accepts_absolute_data_dir() {
        assert!(validate_data_dir(Path::new("/var/lib/ledger-node")).is_ok());
    }

    #[test]
    fn ephemeral_genesis_has_sorted_witnesses() {
        let (params, keys) = generate_ephemeral_genesis("1".to_string());
        assert_eq!(params.witnesses.len(), COUNT_WITNESSES);
        assert_eq!(keys.len(), COUNT_WITNESSES);
        let mut sorted = params.witnesses.clone();
        sorted.sort();
        assert_eq!(sorted, params.witnesses);
    }
}
