//! Gated outbound HTTP for sandboxed scripts.
//!
//! The sandbox never touches the network directly. Every request a script
//! makes goes through a [`RequestGate`] that is created fresh for one
//! execution and enforces:
//!
//! - a per-run request quota
//! - URL length and timeout caps, checked before anything is counted
//! - request and response body size caps
//! - no dispatch once the host has aborted the run
//!
//! # Architecture
//!
//! ```text
//! Script (sandboxed)
//!   │  HttpCallSpec
//!   ▼
//! RequestGate::perform_request()   preflight → quota → prepare
//!   │  PreparedRequest
//!   ▼  (IO boundary)
//! HttpTransport::send()
//!   │  RawResponse
//!   ▼
//! HttpCallOutcome { Ok | Err }     stripped of transport internals
//! ```
//!
//! A gated call never fails as a Rust error: every rejection comes back to the
//! script as an [`HttpCallOutcome::Err`] so it can implement its own fallback.

pub mod abort;
pub mod error;
pub mod gate;
#[cfg(feature = "http")]
pub mod http;
pub mod testing;
pub mod types;

pub use abort::AbortSignal;
pub use error::{AdapterError, GateError};
pub use gate::{GateLimits, RequestGate};
#[cfg(feature = "http")]
pub use http::ReqwestTransport;
pub use types::{
    HttpCallOutcome, HttpCallSpec, HttpFailure, HttpResponse, HttpTransport, PreparedRequest,
    RawResponse, RequestLogEntry, ResponseData, ResponseType,
};
