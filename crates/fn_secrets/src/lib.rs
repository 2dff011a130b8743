//! Secrets pipeline for function requests.
//!
//! - [`cipher`]: ECIES encryption to the DON public key, signed envelopes.
//! - [`verify`]: checks that every hosted secrets document is identical and
//!   covers the expected nodes.
//! - [`request`]: config validation and [`build_request`].
//! - [`offchain`]: the document hosted at a secrets URL.

pub mod cipher;
pub mod error;
pub mod offchain;
pub mod request;
pub mod verify;

pub use cipher::{
    decrypt, encrypt, encrypt_with_signature, public_key_from_private, recover_public_key,
    sign_message, SecretsEnvelope,
};
pub use error::{ConfigError, Result, SecretsError};
pub use offchain::build_offchain_secrets;
pub use request::{build_request, FunctionsRequest, RequestConfig, ReturnType};
pub use verify::{
    check_records, ConsistencyReport, FallbackWarning, OffchainSecretsRecord, SecretsVerifier,
};
