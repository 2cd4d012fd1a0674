pub mod definition;
pub mod dilithium;
pub mod hash;
pub mod keypair;

pub use definition::{verify_author, DefinitionError};
pub use dilithium::{verify_signature, LedgerSigner, SignatureError};
pub use hash::{address_from_definition, ball_hash, canonical_encode, sha256, unit_hash, verify_address_checksum};
pub use keypair::KeyPair;
