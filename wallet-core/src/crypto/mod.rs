pub mod derivation;
pub mod mnemonic;
pub mod ton;

pub use derivation::{
    derive_address, derive_addresses, derive_seed, derive_signing_key, to_checksum_address,
    ChainKeyPair, Seed,
};
pub use mnemonic::{english_wordlist, entropy_to_mnemonic, generate, Mnemonic, Wordlist};
