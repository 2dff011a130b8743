//! Conversion between script values and host values.

use boa_engine::object::builtins::JsUint8Array;
use boa_engine::{js_string, Context, JsNativeError, JsObject, JsResult, JsString, JsValue};
use serde::Serialize;

/// Upper bound on array-like lengths copied out of the engine.
pub const MAX_BYTES_COPY: u64 = 4 * 1024 * 1024;

/// What a script resolved to, detached from the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ScriptValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    /// Decimal rendering of an arbitrary-precision integer.
    BigInt(String),
    String(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl ScriptValue {
    pub fn from_js(value: &JsValue, ctx: &mut Context) -> JsResult<Self> {
        if value.is_undefined() {
            return Ok(ScriptValue::Undefined);
        }
        if value.is_null() {
            return Ok(ScriptValue::Null);
        }
        if let Some(b) = value.as_boolean() {
            return Ok(ScriptValue::Bool(b));
        }
        if let Some(n) = value.as_number() {
            return Ok(ScriptValue::Number(n));
        }
        if let Some(b) = value.as_bigint() {
            return Ok(ScriptValue::BigInt(b.to_string()));
        }
        if let Some(s) = value.as_string() {
            return Ok(ScriptValue::String(s.to_std_string_escaped()));
        }
        if let Some(obj) = value.as_object() {
            if is_uint8_array(obj) {
                return Ok(ScriptValue::Bytes(bytes_from_array_like(obj, ctx)?));
            }
        }
        Ok(ScriptValue::Json(value.to_json(ctx)?))
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ScriptValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Undefined => "undefined",
            ScriptValue::Null => "null",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Number(_) => "number",
            ScriptValue::BigInt(_) => "bigint",
            ScriptValue::String(_) => "string",
            ScriptValue::Bytes(_) => "Buffer",
            ScriptValue::Json(_) => "object",
        }
    }
}

pub fn is_uint8_array(obj: &JsObject) -> bool {
    JsUint8Array::from_object(obj.clone()).is_ok()
}

/// Copy bytes out of any array-like object (typed array or plain array of
/// numbers). Elements are truncated to `u8` the way typed arrays do.
pub fn bytes_from_array_like(obj: &JsObject, ctx: &mut Context) -> JsResult<Vec<u8>> {
    let len = obj.get(js_string!("length"), ctx)?.to_length(ctx)?;
    if len > MAX_BYTES_COPY {
        return Err(JsNativeError::range()
            .with_message(format!("byte array longer than {MAX_BYTES_COPY}"))
            .into());
    }
    let mut out = Vec::with_capacity(len as usize);
    for i in 0..len as u32 {
        out.push(obj.get(i, ctx)?.to_uint8(ctx)?);
    }
    Ok(out)
}

pub fn bytes_to_js(bytes: &[u8], ctx: &mut Context) -> JsResult<JsValue> {
    Ok(JsUint8Array::from_iter(bytes.iter().copied(), ctx)?.into())
}

/// Script-visible type name, used in codec errors and diagnostics.
pub fn js_type_name(value: &JsValue) -> &'static str {
    if value.is_undefined() {
        "undefined"
    } else if value.is_null() {
        "null"
    } else if value.is_boolean() {
        "boolean"
    } else if value.is_number() {
        "number"
    } else if value.is_bigint() {
        "bigint"
    } else if value.is_string() {
        "string"
    } else if value.is_symbol() {
        "symbol"
    } else if value.is_callable() {
        "function"
    } else {
        "object"
    }
}

/// Read a property and render it as a Rust string, skipping `undefined`.
pub fn string_property(obj: &JsObject, key: &str, ctx: &mut Context) -> Option<String> {
    let value = obj.get(JsString::from(key), ctx).ok()?;
    if value.is_undefined() {
        return None;
    }
    value
        .to_string(ctx)
        .ok()
        .map(|s| s.to_std_string_escaped())
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::Source;

    fn eval(src: &str) -> (JsValue, Context) {
        let mut ctx = Context::default();
        let v = ctx.eval(Source::from_bytes(src)).unwrap();
        (v, ctx)
    }

    #[test]
    fn primitives_convert() {
        let (v, mut ctx) = eval("'abc'");
        assert_eq!(ScriptValue::from_js(&v, &mut ctx).unwrap(), ScriptValue::String("abc".into()));
        let (v, mut ctx) = eval("12n ** 30n");
        assert!(matches!(ScriptValue::from_js(&v, &mut ctx).unwrap(), ScriptValue::BigInt(_)));
        let (v, mut ctx) = eval("undefined");
        assert_eq!(ScriptValue::from_js(&v, &mut ctx).unwrap(), ScriptValue::Undefined);
    }

    #[test]
    fn uint8_array_becomes_bytes() {
        let (v, mut ctx) = eval("new Uint8Array([1, 2, 255])");
        assert_eq!(
            ScriptValue::from_js(&v, &mut ctx).unwrap(),
            ScriptValue::Bytes(vec![1, 2, 255])
        );
    }

    #[test]
    fn plain_array_is_json_not_bytes() {
        let (v, mut ctx) = eval("[1, 2, 3]");
        let out = ScriptValue::from_js(&v, &mut ctx).unwrap();
        assert_eq!(out, ScriptValue::Json(serde_json::json!([1, 2, 3])));
        assert!(out.as_bytes().is_none());
    }

    #[test]
    fn array_like_bytes_wrap_like_typed_arrays() {
        let (v, mut ctx) = eval("[1, 256, -1]");
        let obj = v.as_object().unwrap().clone();
        assert_eq!(bytes_from_array_like(&obj, &mut ctx).unwrap(), vec![1, 0, 255]);
    }
}
