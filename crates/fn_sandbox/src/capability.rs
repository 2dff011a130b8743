//! Globals installed into a fresh script context.
//!
//! | global      | contents                                                   |
//! |-------------|------------------------------------------------------------|
//! | `args`      | caller arguments (array of strings)                        |
//! | `secrets`   | caller secrets (object of strings, `{}` when none)         |
//! | `Functions` | `makeHttpRequest`, `encodeUint256`, `encodeInt256`, `encodeString` |
//! |             | (also as `performRequest`, `encodeUnsignedInt`, `encodeSignedInt`) |
//! | `require`   | allow-listed utility modules, see [`crate::modules`]       |
//! | `console`   | `log`/`info`/`warn`/`error`, silent unless logging is on   |
//!
//! `eval` is removed.

use crate::codec::{self, CodecInput};
use crate::error::CodecError;
use crate::modules;
use crate::value::{bytes_to_js, js_type_name};
use boa_engine::object::builtins::JsUint8Array;
use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{
    js_string, Context, JsArgs, JsError, JsNativeError, JsResult, JsValue, NativeFunction,
};
use boa_gc::{Finalize, Trace};
use fn_adapter::{GateError, HttpCallOutcome, HttpCallSpec, RequestGate, ResponseData};
use num_bigint::BigInt;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::str::FromStr;

/// The run's gate, shared with the native `makeHttpRequest`.
#[derive(Clone, Trace, Finalize)]
pub struct GateHandle(#[unsafe_ignore_trace] Rc<RefCell<RequestGate>>);

impl GateHandle {
    pub fn new(gate: RequestGate) -> Self {
        Self(Rc::new(RefCell::new(gate)))
    }

    pub fn with<R>(&self, f: impl FnOnce(&RequestGate) -> R) -> R {
        f(&self.0.borrow())
    }
}

/// What a run exposes to its script.
pub struct Bindings<'a> {
    pub args: &'a [String],
    pub secrets: Option<&'a BTreeMap<String, String>>,
    pub sandboxed_logging: bool,
}

pub fn install(ctx: &mut Context, gate: &GateHandle, bindings: &Bindings<'_>) -> JsResult<()> {
    let frozen = Attribute::READONLY | Attribute::NON_ENUMERABLE | Attribute::PERMANENT;

    let args = JsValue::from_json(&serde_json::json!(bindings.args), ctx)?;
    ctx.register_global_property(js_string!("args"), args, frozen)?;

    let secrets = match bindings.secrets {
        Some(s) => serde_json::json!(s),
        None => serde_json::json!({}),
    };
    let secrets = JsValue::from_json(&secrets, ctx)?;
    ctx.register_global_property(js_string!("secrets"), secrets, frozen)?;

    let http = NativeFunction::from_copy_closure_with_captures(make_http_request, gate.clone());
    let functions = ObjectInitializer::new(ctx)
        .function(http.clone(), js_string!("makeHttpRequest"), 1)
        .function(http, js_string!("performRequest"), 1)
        .function(NativeFunction::from_fn_ptr(encode_uint256), js_string!("encodeUint256"), 1)
        .function(NativeFunction::from_fn_ptr(encode_uint256), js_string!("encodeUnsignedInt"), 1)
        .function(NativeFunction::from_fn_ptr(encode_int256), js_string!("encodeInt256"), 1)
        .function(NativeFunction::from_fn_ptr(encode_int256), js_string!("encodeSignedInt"), 1)
        .function(NativeFunction::from_fn_ptr(encode_string), js_string!("encodeString"), 1)
        .build();
    ctx.register_global_property(js_string!("Functions"), functions, frozen)?;

    ctx.register_global_callable(
        js_string!("require"),
        1,
        NativeFunction::from_fn_ptr(modules::require),
    )?;

    let log: fn(&JsValue, &[JsValue], &mut Context) -> JsResult<JsValue> =
        if bindings.sandboxed_logging {
            console_log
        } else {
            console_silent
        };
    let console = ObjectInitializer::new(ctx)
        .function(NativeFunction::from_fn_ptr(log), js_string!("log"), 0)
        .function(NativeFunction::from_fn_ptr(log), js_string!("info"), 0)
        .function(NativeFunction::from_fn_ptr(log), js_string!("warn"), 0)
        .function(NativeFunction::from_fn_ptr(log), js_string!("error"), 0)
        .build();
    ctx.register_global_property(js_string!("console"), console, Attribute::all())?;

    let global = ctx.global_object();
    global.delete_property_or_throw(js_string!("eval"), ctx)?;
    Ok(())
}

fn make_http_request(
    _this: &JsValue,
    args: &[JsValue],
    gate: &GateHandle,
    ctx: &mut Context,
) -> JsResult<JsValue> {
    let arg = args.get_or_undefined(0);
    let json = if arg.is_object() && !arg.is_callable() {
        arg.to_json(ctx).ok()
    } else {
        None
    };
    let url = json
        .as_ref()
        .and_then(|j| j.get("url"))
        .and_then(|u| u.as_str())
        .unwrap_or_default()
        .to_string();

    let outcome = match json.map(serde_json::from_value::<HttpCallSpec>) {
        Some(Ok(spec)) => gate.0.borrow_mut().perform_request(&spec),
        Some(Err(e)) => {
            let err = GateError::InvalidRequest(e.to_string());
            gate.0.borrow_mut().reject(&url, "GET", err)
        }
        None => {
            let err = GateError::InvalidRequest("request must be an object".into());
            gate.0.borrow_mut().reject(&url, "GET", err)
        }
    };
    outcome_to_js(&outcome, ctx)
}

/// Script-facing response object. `arraybuffer` bodies become a `Uint8Array`.
fn outcome_to_js(outcome: &HttpCallOutcome, ctx: &mut Context) -> JsResult<JsValue> {
    let value = JsValue::from_json(&outcome.to_json(), ctx)?;
    if let HttpCallOutcome::Ok(resp) = outcome {
        if let (ResponseData::Bytes(bytes), Some(obj)) = (&resp.data, value.as_object()) {
            let data = JsUint8Array::from_iter(bytes.iter().copied(), ctx)?;
            obj.set(js_string!("data"), data, true, ctx)?;
        }
    }
    Ok(value)
}

fn codec_input(value: &JsValue) -> CodecInput {
    if let Some(n) = value.as_number() {
        return CodecInput::Number(n);
    }
    if let Some(b) = value.as_bigint() {
        return match BigInt::from_str(&b.to_string()) {
            Ok(v) => CodecInput::BigInt(v),
            Err(_) => CodecInput::Other("bigint"),
        };
    }
    if let Some(s) = value.as_string() {
        return CodecInput::String(s.to_std_string_escaped());
    }
    CodecInput::Other(js_type_name(value))
}

fn codec_error(e: CodecError) -> JsError {
    JsNativeError::error().with_message(e.to_string()).into()
}

fn encode_uint256(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let word = codec::encode_unsigned_int(&codec_input(args.get_or_undefined(0)))
        .map_err(codec_error)?;
    bytes_to_js(&word, ctx)
}

fn encode_int256(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let word = codec::encode_signed_int(&codec_input(args.get_or_undefined(0)))
        .map_err(codec_error)?;
    bytes_to_js(&word, ctx)
}

fn encode_string(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let bytes = codec::encode_string(&codec_input(args.get_or_undefined(0))).map_err(codec_error)?;
    bytes_to_js(&bytes, ctx)
}

fn console_log(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let line = args
        .iter()
        .map(|a| modules::render(a, ctx))
        .collect::<Vec<_>>()
        .join(" ");
    tracing::info!(target: "sandbox", "{line}");
    Ok(JsValue::undefined())
}

fn console_silent(_this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
    Ok(JsValue::undefined())
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::Source;
    use fn_adapter::testing::StaticTransport;
    use std::sync::Arc;

    fn context(quota: u32) -> (Context, GateHandle) {
        let transport = Arc::new(StaticTransport::json(200, serde_json::json!({"price": 7})));
        let gate = GateHandle::new(RequestGate::new(quota, transport));
        let mut ctx = Context::default();
        let args = vec!["ETH".to_string()];
        let bindings = Bindings {
            args: &args,
            secrets: None,
            sandboxed_logging: false,
        };
        install(&mut ctx, &gate, &bindings).unwrap();
        (ctx, gate)
    }

    fn eval_string(ctx: &mut Context, src: &str) -> String {
        let v = ctx.eval(Source::from_bytes(src)).unwrap();
        v.to_string(ctx).unwrap().to_std_string_escaped()
    }

    #[test]
    fn bindings_are_visible() {
        let (mut ctx, _) = context(0);
        assert_eq!(eval_string(&mut ctx, "args[0]"), "ETH");
        assert_eq!(eval_string(&mut ctx, "JSON.stringify(secrets)"), "{}");
        assert_eq!(eval_string(&mut ctx, "typeof eval"), "undefined");
        assert_eq!(eval_string(&mut ctx, "typeof process"), "undefined");
    }

    #[test]
    fn http_goes_through_the_gate() {
        let (mut ctx, gate) = context(1);
        let src = r#"
            const a = Functions.makeHttpRequest({ url: "https://api.example.com/p" });
            const b = Functions.makeHttpRequest({ url: "https://api.example.com/p" });
            [a.error, a.data.price, b.error, b.name].join(",")
        "#;
        assert_eq!(eval_string(&mut ctx, src), "false,7,true,QuotaExceeded");
        gate.with(|g| {
            assert_eq!(g.used(), 1);
            assert_eq!(g.request_log().len(), 2);
        });
    }

    #[test]
    fn malformed_request_is_an_error_object() {
        let (mut ctx, gate) = context(1);
        let out = eval_string(&mut ctx, "Functions.makeHttpRequest('nope').name");
        assert_eq!(out, "InvalidRequest");
        gate.with(|g| assert_eq!(g.used(), 0));
    }

    #[test]
    fn encoders_return_byte_arrays() {
        let (mut ctx, _) = context(0);
        assert_eq!(eval_string(&mut ctx, "Functions.encodeUint256(1).length"), "32");
        assert_eq!(eval_string(&mut ctx, "Functions.encodeInt256(-1)[0]"), "255");
        assert_eq!(eval_string(&mut ctx, "Functions.encodeUint256(2n ** 255n)[0]"), "128");
        assert_eq!(eval_string(&mut ctx, "Functions.encodeString('hi').length"), "2");
        assert_eq!(eval_string(&mut ctx, "Functions.encodeSignedInt(-2)[31]"), "254");
        let out = eval_string(
            &mut ctx,
            "try { Functions.encodeUint256(-1); 'ok' } catch (e) { e.message }",
        );
        assert_eq!(out, "encodeUint256 invalid input");
    }
}
