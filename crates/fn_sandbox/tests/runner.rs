use fn_adapter::testing::StaticTransport;
use fn_adapter::{AbortSignal, AdapterError, HttpTransport, PreparedRequest, RawResponse};
use fn_sandbox::{
    encode_response, ExecutionRequest, RunState, SandboxError, SandboxRunner, ScratchSpace,
    ScriptLimits, ScriptValue, Validator,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn runner(scratch: &tempfile::TempDir) -> (SandboxRunner, Arc<StaticTransport>) {
    let transport = Arc::new(StaticTransport::json(200, json!({"USD": 1234.5})));
    let runner = SandboxRunner::new(transport.clone(), ScratchSpace::new(scratch.path()));
    (runner, transport)
}

#[test]
fn price_script_returns_encoded_word() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, transport) = runner(&dir);
    let src = r#"
        const res = await Functions.makeHttpRequest({
            url: `https://min-api.example.com/data/price?fsym=${args[0]}`,
        });
        if (res.error) throw Error("request failed");
        return Functions.encodeUint256(Math.round(res.data.USD * 100));
    "#;
    let req = ExecutionRequest::new(src, 1).with_args(["ETH"]);
    let eval = runner.evaluate(&req).unwrap();

    let bytes = eval.result.as_bytes().unwrap();
    assert_eq!(bytes.len(), 32);
    assert_eq!(&bytes[28..], &123450u32.to_be_bytes());
    assert_eq!(eval.request_log.len(), 1);
    assert!(eval.request_log[0].dispatched);
    assert_eq!(transport.requests()[0].url, "https://min-api.example.com/data/price?fsym=ETH");
    assert_eq!(runner.state(), RunState::Idle);
    assert_eq!(runner.last_outcome(), Some(RunState::Succeeded));
}

#[test]
fn quota_exhaustion_is_visible_to_the_script() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, transport) = runner(&dir);
    let src = r#"
        const names = [];
        for (let i = 0; i < 4; i++) {
            const r = await Functions.makeHttpRequest({ url: "https://a.example/" + i });
            names.push(r.error ? r.name : "ok");
        }
        return Functions.encodeString(names.join(","));
    "#;
    let eval = runner.evaluate(&ExecutionRequest::new(src, 3)).unwrap();
    assert_eq!(eval.result.as_bytes().unwrap(), b"ok,ok,ok,QuotaExceeded");
    assert_eq!(transport.requests().len(), 3);
    assert_eq!(eval.request_log.len(), 4);
    assert!(!eval.request_log[3].dispatched);
}

#[test]
fn fresh_quota_per_run() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, _) = runner(&dir);
    let src = r#"
        const r = await Functions.makeHttpRequest({ url: "https://a.example" });
        return Functions.encodeString(r.error ? r.name : "ok");
    "#;
    for _ in 0..2 {
        let eval = runner.evaluate(&ExecutionRequest::new(src, 1)).unwrap();
        assert_eq!(eval.result.as_bytes().unwrap(), b"ok");
    }
}

#[test]
fn oversized_timeout_is_rejected_without_quota() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, transport) = runner(&dir);
    let src = r#"
        const slow = await Functions.makeHttpRequest({ url: "https://a.example", timeout: 9001 });
        const ok = await Functions.makeHttpRequest({ url: "https://a.example" });
        return Functions.encodeString(`${slow.name}|${ok.error}`);
    "#;
    let eval = runner.evaluate(&ExecutionRequest::new(src, 1)).unwrap();
    assert_eq!(eval.result.as_bytes().unwrap(), b"TimeoutTooLarge|false");
    assert_eq!(transport.requests().len(), 1);
}

#[test]
fn syntax_error_is_a_compile_error() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, transport) = runner(&dir);
    let err = runner
        .evaluate(&ExecutionRequest::new("return (1 +;", 5))
        .unwrap_err();
    assert!(matches!(err, SandboxError::Compile { .. }), "{err:?}");
    assert_eq!(err.name(), "SyntaxError");
    assert!(transport.requests().is_empty());
    assert_eq!(runner.last_outcome(), Some(RunState::Failed));
}

#[test]
fn thrown_error_carries_request_log() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, _) = runner(&dir);
    let src = r#"
        await Functions.makeHttpRequest({ url: "https://a.example/one" });
        throw new TypeError("bad data");
    "#;
    let err = runner.evaluate(&ExecutionRequest::new(src, 2)).unwrap_err();
    assert_eq!(err.kind(), "RuntimeError");
    assert_eq!(err.name(), "TypeError");
    assert_eq!(err.message(), "bad data");
    let log = err.request_log().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].url, "https://a.example/one");
}

#[test]
fn thrown_string_is_reported_as_error() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, _) = runner(&dir);
    let err = runner
        .evaluate(&ExecutionRequest::new("throw 'plain'", 0))
        .unwrap_err();
    assert_eq!(err.name(), "Error");
    assert_eq!(err.message(), "plain");
}

#[test]
fn never_settling_script_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, _) = runner(&dir);
    let err = runner
        .evaluate(&ExecutionRequest::new("await new Promise(() => {}); return 1;", 0))
        .unwrap_err();
    assert_eq!(err.message(), "script did not settle");
}

#[test]
fn runaway_loop_hits_the_iteration_limit() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, _) = runner(&dir);
    let mut runner = runner.with_script_limits(ScriptLimits {
        loop_iterations: 10_000,
        recursion_depth: 64,
    });
    let err = runner
        .evaluate(&ExecutionRequest::new("while (true) {}", 0))
        .unwrap_err();
    assert_eq!(err.kind(), "RuntimeError");
}

#[test]
fn loop_budget_follows_the_execution_timeout() {
    let limits = ScriptLimits::for_timeout(Duration::from_secs(10));
    assert_eq!(limits.loop_iterations, ScriptLimits::default().loop_iterations);
    assert_eq!(ScriptLimits::for_timeout(Duration::from_millis(300)).loop_iterations, 300_000);
    assert_eq!(ScriptLimits::for_timeout(Duration::ZERO).loop_iterations, 1);
}

#[test]
fn aborted_run_never_starts() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, transport) = runner(&dir);
    let abort = AbortSignal::new();
    abort.abort();
    let src = r#"
        await Functions.makeHttpRequest({ url: "https://side-effect.example/pay" });
        return Functions.encodeUint256(2);
    "#;
    let err = runner
        .evaluate_with_abort(&ExecutionRequest::new(src, 1), &abort)
        .unwrap_err();
    assert_eq!(err.name(), "AbortedError");
    assert!(transport.requests().is_empty());
    assert_eq!(runner.last_outcome(), Some(RunState::Failed));
}

/// Raises the abort signal the first time anything is sent.
struct AbortOnSend {
    inner: StaticTransport,
    abort: AbortSignal,
}

impl HttpTransport for AbortOnSend {
    fn send(&self, request: &PreparedRequest) -> Result<RawResponse, AdapterError> {
        self.abort.abort();
        self.inner.send(request)
    }
}

#[test]
fn abort_mid_run_refuses_later_requests() {
    let dir = tempfile::tempdir().unwrap();
    let abort = AbortSignal::new();
    let transport = Arc::new(AbortOnSend {
        inner: StaticTransport::json(200, json!({"ok": true})),
        abort: abort.clone(),
    });
    let mut runner = SandboxRunner::new(transport.clone(), ScratchSpace::new(dir.path()));
    let src = r#"
        const first = await Functions.makeHttpRequest({ url: "https://a.example/1" });
        const second = await Functions.makeHttpRequest({ url: "https://side-effect.example/pay" });
        return Functions.encodeString(`${first.error}|${second.name}`);
    "#;
    let eval = runner
        .evaluate_with_abort(&ExecutionRequest::new(src, 2), &abort)
        .unwrap();
    assert_eq!(eval.result.as_bytes().unwrap(), b"false|RunAborted");
    let sent = transport.inner.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].url, "https://a.example/1");
}

#[test]
fn args_and_secrets_are_bound() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, _) = runner(&dir);
    let mut secrets = BTreeMap::new();
    secrets.insert("apiKey".to_string(), "s3cr3t".to_string());
    let req = ExecutionRequest::new(
        "return Functions.encodeString(args.join('-') + ':' + secrets.apiKey)",
        0,
    )
    .with_args(["a", "b"])
    .with_secrets(secrets);
    let eval = runner.evaluate(&req).unwrap();
    assert_eq!(eval.result.as_bytes().unwrap(), b"a-b:s3cr3t");
}

#[test]
fn host_capabilities_are_absent() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, _) = runner(&dir);
    let src = r#"
        const seen = [typeof process, typeof fetch, typeof eval, typeof XMLHttpRequest];
        let fs;
        try { require("fs"); fs = "loaded"; } catch (e) { fs = e.message; }
        return Functions.encodeString(seen.join(",") + "|" + fs);
    "#;
    let eval = runner.evaluate(&ExecutionRequest::new(src, 0)).unwrap();
    assert_eq!(
        eval.result.as_bytes().unwrap(),
        b"undefined,undefined,undefined,undefined|module 'fs' is not allowed"
    );
}

#[test]
fn scratch_is_empty_around_every_run() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("previous-run.bin"), b"stale").unwrap();
    let (mut runner, _) = runner(&dir);
    runner
        .evaluate(&ExecutionRequest::new("return Functions.encodeUint256(1)", 0))
        .unwrap();
    assert!(runner.scratch().is_empty());

    std::fs::write(dir.path().join("leak.bin"), b"x").unwrap();
    runner.evaluate(&ExecutionRequest::new("throw 1", 0)).unwrap_err();
    assert!(runner.scratch().is_empty());
}

#[test]
fn non_bytes_result_fails_output_validation() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, _) = runner(&dir);
    let eval = runner.evaluate(&ExecutionRequest::new("return 'text'", 0)).unwrap();
    assert_eq!(eval.result, ScriptValue::String("text".into()));

    let validator = Validator::default();
    let err = validator.valid_output(&eval.result, 256).unwrap_err();
    assert_eq!(err.to_string(), "returned value not a Buffer");
}

#[test]
fn validated_request_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (mut runner, _) = runner(&dir);
    let validator = Validator::default();
    let input = validator
        .validate_input(&json!({
            "source": "return Functions.encodeInt256(BigInt(args[0]))",
            "args": ["-2"],
            "maxResponseBytes": 32
        }))
        .unwrap();
    let eval = runner.evaluate(&input.request).unwrap();
    let bytes = validator
        .valid_output(&eval.result, input.max_response_bytes)
        .unwrap();
    assert_eq!(
        encode_response(bytes),
        format!("0x{}fe", "ff".repeat(31))
    );
}
