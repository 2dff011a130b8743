//! Sandboxed execution of untrusted request scripts.
//!
//! Guarantees per run:
//! - No ambient IO: the script sees only `args`, `secrets`, the `Functions`
//!   capability object and an allow-list of pure utility modules
//! - Outbound HTTP only through a fresh, quota-bound [`fn_adapter::RequestGate`]
//! - Shared scratch space cleared before and after the run
//! - Failures surfaced as a structured [`SandboxError`], never a raw engine error
//!
//! Results are encoded into fixed-width layouts by [`codec`] when the script
//! asks for it (`Functions.encodeUint256(...)` and friends).

pub mod capability;
pub mod codec;
pub mod error;
pub mod modules;
pub mod runner;
pub mod scratch;
pub mod validate;
pub mod value;

pub use codec::{encode_signed_int, encode_string, encode_unsigned_int, CodecInput};
pub use error::{CodecError, SandboxError};
pub use runner::{
    Evaluation, ExecutionRequest, RunState, SandboxRunner, ScriptLimits, LOOP_ITERATIONS_PER_SECOND,
};
pub use scratch::{ScratchLease, ScratchSpace};
pub use validate::{encode_response, InputError, ValidatedInput, Validator};
pub use value::ScriptValue;
