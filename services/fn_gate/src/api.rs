use crate::error::AppError;
use crate::AppState;
use axum::{extract::State, Json};
use fn_adapter::{AbortSignal, HttpTransport, ReqwestTransport};
use fn_sandbox::{encode_response, Evaluation, ExecutionRequest, SandboxError, SandboxRunner};
use fn_secrets::FunctionsRequest;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

/// Run one script on a blocking worker. Builds the network transport
/// here so the blocking client never lives on an async thread.
fn run_blocking(
    state: &AppState,
    request: &ExecutionRequest,
    abort: &AbortSignal,
) -> Result<Evaluation, AppError> {
    let transport: Arc<dyn HttpTransport> = match &state.transport {
        Some(t) => t.clone(),
        None => Arc::new(
            ReqwestTransport::new().map_err(|e| AppError::internal(format!("transport: {e}")))?,
        ),
    };
    let mut runner = SandboxRunner::new(transport, state.scratch.clone())
        .with_script_limits(state.script_limits)
        .with_sandboxed_logging(state.settings.sandboxed_logging);
    Ok(runner.evaluate_with_abort(request, abort)?)
}

pub async fn evaluate(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let input = state.validator.validate_input(&body)?;
    let limit = state.settings.execution_timeout;

    // The worker cannot be pre-empted; a fired watchdog aborts it instead,
    // so a run still queued on the scratch lease never starts and a running
    // one makes no further requests.
    let abort = AbortSignal::new();
    let worker_abort = abort.clone();
    let worker_state = state.clone();
    let request = input.request.clone();
    let job = tokio::task::spawn_blocking(move || {
        run_blocking(&worker_state, &request, &worker_abort)
    });

    let eval = match tokio::time::timeout(limit, job).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => return Err(AppError::internal(format!("sandbox worker failed: {e}"))),
        Err(_) => {
            abort.abort();
            warn!(limit_ms = limit.as_millis() as u64, request_id = ?input.request_id, "sandbox watchdog fired");
            return Err(SandboxError::timeout(limit.as_millis()).into());
        }
    };

    let bytes = state
        .validator
        .valid_output(&eval.result, input.max_response_bytes)
        .map_err(|e| AppError::invalid_output(e.to_string(), eval.request_log.clone()))?;

    info!(request_id = ?input.request_id, bytes = bytes.len(), "evaluation complete");
    let mut out = json!({
        "result": encode_response(bytes),
        "requestLog": eval.request_log,
    });
    if let Some(id) = input.request_id {
        out["requestId"] = Value::String(id);
    }
    Ok(Json(out))
}

/// Body is a request config plus optional `nodeAddresses`.
pub async fn build_request(Json(mut body): Json<Value>) -> Result<Json<FunctionsRequest>, AppError> {
    let nodes = match body.as_object_mut().and_then(|o| o.remove("nodeAddresses")) {
        None | Some(Value::Null) => Vec::new(),
        Some(v) => serde_json::from_value::<Vec<String>>(v)
            .map_err(|_| AppError::bad_request("nodeAddresses must be an array of strings"))?,
    };
    let request = fn_secrets::build_request(&body, &nodes).await?;
    Ok(Json(request))
}
