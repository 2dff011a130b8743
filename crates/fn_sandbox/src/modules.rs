//! `require(name)` for an allow-list of pure utility modules.
//!
//! None of these touch the filesystem, the network or the process. Any
//! other name throws `module '<name>' is not allowed`.

use crate::value::{bytes_from_array_like, bytes_to_js};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use boa_engine::object::ObjectInitializer;
use boa_engine::{
    js_string, Context, JsArgs, JsNativeError, JsResult, JsString, JsValue, NativeFunction,
};
use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

pub const ALLOWED_MODULES: &[&str] = &[
    "buffer",
    "crypto",
    "querystring",
    "string_decoder",
    "url",
    "util",
];

pub fn require(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let name = args
        .get_or_undefined(0)
        .to_string(ctx)?
        .to_std_string_escaped();
    let module = match name.as_str() {
        "buffer" => ObjectInitializer::new(ctx)
            .function(NativeFunction::from_fn_ptr(buffer_from), js_string!("from"), 2)
            .function(NativeFunction::from_fn_ptr(buffer_to_string), js_string!("toString"), 2)
            .function(NativeFunction::from_fn_ptr(buffer_concat), js_string!("concat"), 2)
            .build(),
        "crypto" => ObjectInitializer::new(ctx)
            .function(NativeFunction::from_fn_ptr(sha256), js_string!("sha256"), 1)
            .function(NativeFunction::from_fn_ptr(keccak256), js_string!("keccak256"), 1)
            .function(NativeFunction::from_fn_ptr(blake3_hex), js_string!("blake3"), 1)
            .build(),
        "querystring" => ObjectInitializer::new(ctx)
            .function(NativeFunction::from_fn_ptr(qs_stringify), js_string!("stringify"), 1)
            .build(),
        "string_decoder" => ObjectInitializer::new(ctx)
            .function(NativeFunction::from_fn_ptr(decode_utf8), js_string!("decode"), 1)
            .build(),
        "url" => ObjectInitializer::new(ctx)
            .function(NativeFunction::from_fn_ptr(url_parse), js_string!("parse"), 1)
            .build(),
        "util" => ObjectInitializer::new(ctx)
            .function(NativeFunction::from_fn_ptr(inspect), js_string!("inspect"), 1)
            .build(),
        other => {
            return Err(JsNativeError::error()
                .with_message(format!("module '{other}' is not allowed"))
                .into())
        }
    };
    Ok(module.into())
}

fn type_error(msg: impl Into<String>) -> boa_engine::JsError {
    JsNativeError::typ().with_message(msg.into()).into()
}

/// Strings are taken as UTF-8, objects as array-likes of bytes.
fn input_bytes(value: &JsValue, ctx: &mut Context) -> JsResult<Vec<u8>> {
    if let Some(s) = value.as_string() {
        return Ok(s.to_std_string_escaped().into_bytes());
    }
    match value.as_object() {
        Some(obj) => bytes_from_array_like(obj, ctx),
        None => Err(type_error("expected a string or byte array")),
    }
}

fn encoding_arg(args: &[JsValue], index: usize, ctx: &mut Context) -> JsResult<String> {
    let v = args.get_or_undefined(index);
    if v.is_undefined() {
        return Ok("utf8".into());
    }
    Ok(v.to_string(ctx)?.to_std_string_escaped().to_ascii_lowercase())
}

fn buffer_from(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let input = args.get_or_undefined(0);
    let bytes = match input.as_string() {
        Some(s) => {
            let s = s.to_std_string_escaped();
            match encoding_arg(args, 1, ctx)?.as_str() {
                "utf8" | "utf-8" => s.into_bytes(),
                "hex" => hex::decode(s.trim_start_matches("0x"))
                    .map_err(|e| type_error(format!("invalid hex: {e}")))?,
                "base64" => B64
                    .decode(s.as_bytes())
                    .map_err(|e| type_error(format!("invalid base64: {e}")))?,
                other => return Err(type_error(format!("unknown encoding '{other}'"))),
            }
        }
        None => input_bytes(input, ctx)?,
    };
    bytes_to_js(&bytes, ctx)
}

fn buffer_to_string(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let bytes = input_bytes(args.get_or_undefined(0), ctx)?;
    let out = match encoding_arg(args, 1, ctx)?.as_str() {
        "utf8" | "utf-8" => String::from_utf8_lossy(&bytes).into_owned(),
        "hex" => hex::encode(&bytes),
        "base64" => B64.encode(&bytes),
        other => return Err(type_error(format!("unknown encoding '{other}'"))),
    };
    Ok(JsString::from(out.as_str()).into())
}

fn buffer_concat(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let mut out = Vec::new();
    for arg in args {
        out.extend(input_bytes(arg, ctx)?);
    }
    bytes_to_js(&out, ctx)
}

fn sha256(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let bytes = input_bytes(args.get_or_undefined(0), ctx)?;
    Ok(JsString::from(hex::encode(Sha256::digest(&bytes)).as_str()).into())
}

fn keccak256(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let bytes = input_bytes(args.get_or_undefined(0), ctx)?;
    let mut hasher = Keccak::v256();
    let mut out = [0u8; 32];
    hasher.update(&bytes);
    hasher.finalize(&mut out);
    Ok(JsString::from(hex::encode(out).as_str()).into())
}

fn blake3_hex(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let bytes = input_bytes(args.get_or_undefined(0), ctx)?;
    Ok(JsString::from(blake3::hash(&bytes).to_hex().as_str()).into())
}

fn qs_stringify(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let json = args.get_or_undefined(0).to_json(ctx)?;
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    if let serde_json::Value::Object(map) = json {
        for (k, v) in map {
            match v {
                serde_json::Value::Array(items) => {
                    for item in items {
                        ser.append_pair(&k, &scalar(&item));
                    }
                }
                other => {
                    ser.append_pair(&k, &scalar(&other));
                }
            }
        }
    }
    Ok(JsString::from(ser.finish().as_str()).into())
}

fn scalar(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn decode_utf8(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let bytes = input_bytes(args.get_or_undefined(0), ctx)?;
    Ok(JsString::from(String::from_utf8_lossy(&bytes).as_ref()).into())
}

fn url_parse(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    let raw = args
        .get_or_undefined(0)
        .to_string(ctx)?
        .to_std_string_escaped();
    let parsed = url::Url::parse(&raw).map_err(|_| type_error("Invalid URL"))?;
    let hostname = parsed.host_str().unwrap_or_default().to_string();
    let host = match parsed.port() {
        Some(p) => format!("{hostname}:{p}"),
        None => hostname.clone(),
    };
    let parts = serde_json::json!({
        "href": parsed.as_str(),
        "protocol": format!("{}:", parsed.scheme()),
        "host": host,
        "hostname": hostname,
        "port": parsed.port().map(|p| p.to_string()).unwrap_or_default(),
        "pathname": parsed.path(),
        "search": parsed.query().map(|q| format!("?{q}")).unwrap_or_default(),
        "hash": parsed.fragment().map(|f| format!("#{f}")).unwrap_or_default(),
    });
    JsValue::from_json(&parts, ctx)
}

fn inspect(_this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
    Ok(JsString::from(render(args.get_or_undefined(0), ctx).as_str()).into())
}

/// Human-readable rendering used by `util.inspect` and `console.log`.
pub fn render(value: &JsValue, ctx: &mut Context) -> String {
    if let Some(s) = value.as_string() {
        return s.to_std_string_escaped();
    }
    if value.is_object() && !value.is_callable() {
        if let Ok(json) = value.to_json(ctx) {
            return json.to_string();
        }
    }
    value
        .to_string(ctx)
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_else(|_| "[unprintable]".into())
}
