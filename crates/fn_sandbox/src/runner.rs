//! One sandboxed execution from source to result.
//!
//! ```text
//! Idle → Preparing → (compile fails)            → Failed → Idle
//!                  → Running → (throws/pending) → Failed → Idle
//!                            → (resolves)       → Succeeded → Idle
//! ```
//!
//! The script body runs as an async function, so `await` works at the top
//! level and a synchronous `throw` becomes a rejected promise. Each run gets
//! a new engine context and a new gate; nothing survives between runs except
//! the scratch directory, which is cleared on both sides.

use crate::capability::{self, Bindings, GateHandle};
use crate::error::SandboxError;
use crate::scratch::ScratchSpace;
use crate::value::{string_property, ScriptValue};
use boa_engine::builtins::promise::PromiseState;
use boa_engine::object::builtins::JsPromise;
use boa_engine::{Context, JsError, JsValue, Script, Source};
use fn_adapter::{
    AbortSignal, AdapterError, GateLimits, HttpTransport, RequestGate, RequestLogEntry,
    ReqwestTransport,
};
use fn_config::SandboxSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Caller input for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(rename = "source")]
    pub script_source: String,
    #[serde(default, rename = "args")]
    pub arguments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<BTreeMap<String, String>>,
    #[serde(rename = "numAllowedQueries")]
    pub request_quota: u32,
}

impl ExecutionRequest {
    pub fn new(script_source: impl Into<String>, request_quota: u32) -> Self {
        Self {
            script_source: script_source.into(),
            arguments: Vec::new(),
            secrets: None,
            request_quota,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_secrets(mut self, secrets: BTreeMap<String, String>) -> Self {
        self.secrets = Some(secrets);
        self
    }
}

/// Successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub result: ScriptValue,
    #[serde(rename = "requestLog")]
    pub request_log: Vec<RequestLogEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Preparing,
    Running,
    Succeeded,
    Failed,
}

/// Loop budget granted per second of host execution timeout.
pub const LOOP_ITERATIONS_PER_SECOND: u64 = 1_000_000;

/// Engine-level caps. Exceeding them throws an uncatchable error inside the
/// script, which surfaces as a runtime failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLimits {
    pub loop_iterations: u64,
    pub recursion_depth: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            loop_iterations: 10_000_000,
            recursion_depth: 512,
        }
    }
}

impl ScriptLimits {
    /// Loop budget scaled to the host's execution timeout, so a runaway
    /// loop stops inside the engine close to when the host gives up on it.
    pub fn for_timeout(timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        Self {
            loop_iterations: millis
                .saturating_mul(LOOP_ITERATIONS_PER_SECOND / 1000)
                .max(1),
            ..Self::default()
        }
    }
}

pub struct SandboxRunner {
    transport: Arc<dyn HttpTransport>,
    scratch: ScratchSpace,
    gate_limits: GateLimits,
    script_limits: ScriptLimits,
    sandboxed_logging: bool,
    state: RunState,
    last_outcome: Option<RunState>,
}

impl SandboxRunner {
    pub fn new(transport: Arc<dyn HttpTransport>, scratch: ScratchSpace) -> Self {
        Self {
            transport,
            scratch,
            gate_limits: GateLimits::default(),
            script_limits: ScriptLimits::default(),
            sandboxed_logging: false,
            state: RunState::Idle,
            last_outcome: None,
        }
    }

    /// Runner over the real network, configured from settings.
    pub fn from_settings(settings: &SandboxSettings) -> Result<Self, AdapterError> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Ok(Self::new(transport, ScratchSpace::from_settings(settings))
            .with_script_limits(ScriptLimits::for_timeout(settings.execution_timeout))
            .with_sandboxed_logging(settings.sandboxed_logging))
    }

    pub fn with_gate_limits(mut self, limits: GateLimits) -> Self {
        self.gate_limits = limits;
        self
    }

    pub fn with_script_limits(mut self, limits: ScriptLimits) -> Self {
        self.script_limits = limits;
        self
    }

    pub fn with_sandboxed_logging(mut self, enabled: bool) -> Self {
        self.sandboxed_logging = enabled;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// `Succeeded` or `Failed` for the most recent run.
    pub fn last_outcome(&self) -> Option<RunState> {
        self.last_outcome
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = ?self.state, to = ?next, "sandbox state");
        self.state = next;
    }

    /// Run one script to completion.
    pub fn evaluate(&mut self, request: &ExecutionRequest) -> Result<Evaluation, SandboxError> {
        self.evaluate_with_abort(request, &AbortSignal::new())
    }

    /// Like [`evaluate`](Self::evaluate), for hosts that may give up on the
    /// run. An abort seen after the scratch lease is taken skips the script
    /// entirely; one raised mid-run refuses every further gated request.
    pub fn evaluate_with_abort(
        &mut self,
        request: &ExecutionRequest,
        abort: &AbortSignal,
    ) -> Result<Evaluation, SandboxError> {
        self.transition(RunState::Preparing);
        let scratch = self.scratch.clone();
        let result = {
            let _lease = scratch.lease();
            if abort.is_aborted() {
                warn!("run abandoned before it started");
                Err(SandboxError::runtime(
                    "AbortedError",
                    "run abandoned before it started",
                ))
            } else {
                self.run(request, abort)
            }
        };
        let outcome = if result.is_ok() {
            RunState::Succeeded
        } else {
            RunState::Failed
        };
        self.transition(outcome);
        self.last_outcome = Some(outcome);
        self.transition(RunState::Idle);

        match &result {
            Ok(eval) => info!(
                result = eval.result.type_name(),
                requests = eval.request_log.len(),
                "script succeeded"
            ),
            Err(e) => info!(kind = e.kind(), name = e.name(), "script failed"),
        }
        result
    }

    fn run(
        &mut self,
        request: &ExecutionRequest,
        abort: &AbortSignal,
    ) -> Result<Evaluation, SandboxError> {
        let gate = GateHandle::new(
            RequestGate::new(request.request_quota, self.transport.clone())
                .with_limits(self.gate_limits)
                .with_abort(abort.clone()),
        );
        let mut ctx = Context::default();
        ctx.runtime_limits_mut()
            .set_loop_iteration_limit(self.script_limits.loop_iterations);
        ctx.runtime_limits_mut()
            .set_recursion_limit(self.script_limits.recursion_depth);

        let bindings = Bindings {
            args: &request.arguments,
            secrets: request.secrets.as_ref(),
            sandboxed_logging: self.sandboxed_logging,
        };
        capability::install(&mut ctx, &gate, &bindings)
            .map_err(|e| SandboxError::runtime("SandboxSetupError", e.to_string()))?;

        let wrapped = format!("(async function () {{\n{}\n}})()", request.script_source);
        let script = match Script::parse(Source::from_bytes(wrapped.as_bytes()), None, &mut ctx) {
            Ok(script) => script,
            Err(e) => {
                let (name, message, details) = error_parts(e, &mut ctx);
                return Err(SandboxError::Compile {
                    name,
                    message,
                    details,
                });
            }
        };

        self.transition(RunState::Running);
        let settled = script.evaluate(&mut ctx).and_then(|value| {
            ctx.run_jobs();
            settle(value)
        });

        let outcome = match settled {
            Ok(value) => ScriptValue::from_js(&value, &mut ctx),
            Err(e) => Err(e),
        };
        let request_log = gate.with(|g| g.request_log().to_vec());

        match outcome {
            Ok(result) => Ok(Evaluation {
                result,
                request_log,
            }),
            Err(e) => {
                let (name, message, details) = error_parts(e, &mut ctx);
                Err(SandboxError::Runtime {
                    name,
                    message,
                    details,
                    request_log,
                })
            }
        }
    }
}

/// Resolve the promise returned by the wrapper after the job queue drained.
fn settle(value: JsValue) -> Result<JsValue, JsError> {
    let promise = match value.as_object().cloned().map(JsPromise::from_object) {
        Some(Ok(p)) => p,
        _ => return Ok(value),
    };
    match promise.state() {
        PromiseState::Fulfilled(v) => Ok(v),
        PromiseState::Rejected(reason) => Err(JsError::from_opaque(reason)),
        PromiseState::Pending => Err(boa_engine::JsNativeError::error()
            .with_message("script did not settle")
            .into()),
    }
}

/// `(name, message, details)` of whatever the script threw. Thrown
/// non-errors (`throw "x"`) are reported as `Error` with their string form.
fn error_parts(err: JsError, ctx: &mut Context) -> (String, String, String) {
    if let Ok(native) = err.try_native(ctx) {
        if matches!(native.kind, boa_engine::error::JsNativeErrorKind::RuntimeLimit) {
            let message = native.message().to_string();
            return (
                "RuntimeLimitError".into(),
                message.clone(),
                format!("RuntimeLimitError: {message}"),
            );
        }
    }
    let value = err.to_opaque(ctx);
    match value.as_object().cloned() {
        Some(obj) => {
            let name = string_property(&obj, "name", ctx).unwrap_or_else(|| "Error".into());
            let message = string_property(&obj, "message", ctx).unwrap_or_default();
            let details = string_property(&obj, "stack", ctx)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| format!("{name}: {message}"));
            (name, message, details)
        }
        None => {
            let message = value
                .to_string(ctx)
                .map(|s| s.to_std_string_escaped())
                .unwrap_or_else(|_| err.to_string());
            ("Error".into(), message.clone(), format!("Error: {message}"))
        }
    }
}
