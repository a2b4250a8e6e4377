//! Bidirectional binary-record <-> JSON conversion driven by a record schema.
//!
//! `decode` reads a single binary datum and renders its canonical JSON form;
//! `encode` walks the schema and a JSON document in parallel and emits a binary
//! datum. The two are inverses on admissible documents (modulo JSON key order):
//! decimals render as plain numeric strings and byte sequences as base64, and
//! the encoder accepts both forms back.
//!
//! Union resolution on the encode side follows the wire contract: a JSON `null`
//! selects the null branch; otherwise the first branch whose type shape matches
//! the value is chosen.

use apache_avro::schema::{DecimalSchema, EnumSchema, FixedSchema, RecordSchema, UnionSchema};
use apache_avro::types::Value as Avro;
use apache_avro::{from_avro_datum, to_avro_datum, Decimal, Schema};
use epgw_core::error::GatewayError;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map as JsonMap, Number, Value as Json};

lazy_static! {
    // Accepted text forms for decimal logical values and for bytes.
    static ref DECIMAL_TEXT: Regex = Regex::new(r"^-?\d+(?:\.\d+)?$").unwrap();
    static ref BASE64_TEXT: Regex =
        Regex::new(r"^([A-Za-z0-9+/]{4})*([A-Za-z0-9+/]{3}=|[A-Za-z0-9+/]{2}==)?$").unwrap();
}

/// Parse one binary record datum and emit its canonical JSON form.
///
/// Truncated or malformed input fails with `DecodeError`; a datum that parses
/// but leaves trailing bytes (the classic different-schema-version symptom)
/// fails with `TypeMismatch`.
pub fn decode(bytes: &[u8], schema: &Schema) -> Result<String, GatewayError> {
    if bytes.is_empty() {
        return Err(GatewayError::Decode("empty payload".to_string()));
    }
    let mut reader = bytes;
    let value =
        from_avro_datum(schema, &mut reader, None).map_err(|e| GatewayError::Decode(e.to_string()))?;
    if !reader.is_empty() {
        return Err(GatewayError::TypeMismatch(format!(
            "{} unexpected trailing byte(s) after record datum",
            reader.len()
        )));
    }
    let json = avro_to_json(&value, schema, "/")?;
    serde_json::to_string(&json).map_err(|e| GatewayError::Decode(e.to_string()))
}

/// Read a JSON document through the schema and emit a binary record datum.
pub fn encode(json_text: &str, schema: &Schema) -> Result<Vec<u8>, GatewayError> {
    let json: Json = serde_json::from_str(json_text)
        .map_err(|e| GatewayError::Encode(format!("payload is not valid JSON: {e}")))?;
    let value = json_to_avro(&json, schema, "/")?;
    to_avro_datum(schema, value).map_err(|e| GatewayError::Encode(e.to_string()))
}

fn child(path: &str, segment: &str) -> String {
    if path == "/" {
        format!("/{segment}")
    } else {
        format!("{path}/{segment}")
    }
}

fn type_mismatch(path: &str, expected: &str, actual: &Json) -> GatewayError {
    GatewayError::TypeMismatch(format!("expected {expected} at {path}, found {actual}"))
}

fn unsupported(path: &str, schema: &Schema) -> GatewayError {
    GatewayError::UnsupportedRecordType {
        path: path.to_string(),
        form: format!("{schema:?}"),
    }
}

/// A JSON number that is exactly an integer, tolerating float literals with a
/// zero fraction.
fn json_integer(n: &Number) -> Option<i64> {
    n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| f.is_finite() && f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
            .map(|f| f as i64)
    })
}

fn json_to_avro(json: &Json, schema: &Schema, path: &str) -> Result<Avro, GatewayError> {
    match schema {
        Schema::Union(union) => union_to_avro(json, union, path),
        Schema::Null => match json {
            Json::Null => Ok(Avro::Null),
            other => Err(type_mismatch(path, "null", other)),
        },
        Schema::Boolean => match json {
            Json::Bool(b) => Ok(Avro::Boolean(*b)),
            other => Err(type_mismatch(path, "boolean", other)),
        },
        Schema::Int => match json {
            Json::Number(n) => json_integer(n)
                .and_then(|i| i32::try_from(i).ok())
                .map(Avro::Int)
                .ok_or_else(|| type_mismatch(path, "int", json)),
            other => Err(type_mismatch(path, "int", other)),
        },
        Schema::Long => match json {
            Json::Number(n) => json_integer(n)
                .map(Avro::Long)
                .ok_or_else(|| type_mismatch(path, "long", json)),
            other => Err(type_mismatch(path, "long", other)),
        },
        Schema::Float => match json {
            Json::Number(n) => n
                .as_f64()
                .map(|f| Avro::Float(f as f32))
                .ok_or_else(|| type_mismatch(path, "float", json)),
            other => Err(type_mismatch(path, "float", other)),
        },
        Schema::Double => match json {
            Json::Number(n) => n
                .as_f64()
                .map(Avro::Double)
                .ok_or_else(|| type_mismatch(path, "double", json)),
            other => Err(type_mismatch(path, "double", other)),
        },
        Schema::String => match json {
            Json::String(s) => Ok(Avro::String(s.clone())),
            other => Err(type_mismatch(path, "string", other)),
        },
        Schema::Bytes => bytes_from_json(json, path).map(Avro::Bytes),
        Schema::Fixed(FixedSchema { size, .. }) => {
            let bytes = bytes_from_json(json, path)?;
            if bytes.len() != *size {
                return Err(GatewayError::TypeMismatch(format!(
                    "fixed at {path} requires {size} byte(s), found {}",
                    bytes.len()
                )));
            }
            Ok(Avro::Fixed(*size, bytes))
        }
        Schema::Enum(EnumSchema { symbols, .. }) => match json {
            Json::String(s) => symbols
                .iter()
                .position(|sym| sym == s)
                .map(|idx| Avro::Enum(idx as u32, s.clone()))
                .ok_or_else(|| type_mismatch(path, "enum symbol", json)),
            other => Err(type_mismatch(path, "enum symbol", other)),
        },
        Schema::Decimal(DecimalSchema { scale, .. }) => decimal_from_json(json, *scale, path),
        Schema::Array(array) => match json {
            Json::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    out.push(json_to_avro(item, &array.items, &child(path, &index.to_string()))?);
                }
                Ok(Avro::Array(out))
            }
            _ => Err(GatewayError::ExpectedList(path.to_string())),
        },
        Schema::Map(map) => match json {
            Json::Object(entries) => {
                let mut out = std::collections::HashMap::with_capacity(entries.len());
                for (key, item) in entries {
                    out.insert(key.clone(), json_to_avro(item, &map.types, &child(path, key))?);
                }
                Ok(Avro::Map(out))
            }
            _ => Err(GatewayError::ExpectedMap(path.to_string())),
        },
        Schema::Record(record) => record_to_avro(json, record, path),
        // Logical date/time forms carry their underlying int/long on the wire.
        Schema::Date => match json {
            Json::Number(n) => json_integer(n)
                .and_then(|i| i32::try_from(i).ok())
                .map(Avro::Date)
                .ok_or_else(|| type_mismatch(path, "date (days)", json)),
            other => Err(type_mismatch(path, "date (days)", other)),
        },
        Schema::TimeMillis => match json {
            Json::Number(n) => json_integer(n)
                .and_then(|i| i32::try_from(i).ok())
                .map(Avro::TimeMillis)
                .ok_or_else(|| type_mismatch(path, "time-millis", json)),
            other => Err(type_mismatch(path, "time-millis", other)),
        },
        Schema::TimeMicros => match json {
            Json::Number(n) => json_integer(n)
                .map(Avro::TimeMicros)
                .ok_or_else(|| type_mismatch(path, "time-micros", json)),
            other => Err(type_mismatch(path, "time-micros", other)),
        },
        Schema::TimestampMillis => match json {
            Json::Number(n) => json_integer(n)
                .map(Avro::TimestampMillis)
                .ok_or_else(|| type_mismatch(path, "timestamp-millis", json)),
            other => Err(type_mismatch(path, "timestamp-millis", other)),
        },
        Schema::TimestampMicros => match json {
            Json::Number(n) => json_integer(n)
                .map(Avro::TimestampMicros)
                .ok_or_else(|| type_mismatch(path, "timestamp-micros", json)),
            other => Err(type_mismatch(path, "timestamp-micros", other)),
        },
        other => Err(unsupported(path, other)),
    }
}

fn union_to_avro(json: &Json, union: &UnionSchema, path: &str) -> Result<Avro, GatewayError> {
    if json.is_null() {
        return match union.variants().iter().position(|v| matches!(v, Schema::Null)) {
            Some(idx) => Ok(Avro::Union(idx as u32, Box::new(Avro::Null))),
            None => Err(GatewayError::NullNotAllowedForUnion(path.to_string())),
        };
    }
    for (idx, variant) in union.variants().iter().enumerate() {
        if matches!(variant, Schema::Null) {
            continue;
        }
        if let Ok(value) = json_to_avro(json, variant, path) {
            return Ok(Avro::Union(idx as u32, Box::new(value)));
        }
    }
    Err(GatewayError::NoSuitableUnionBranch(path.to_string()))
}

fn record_to_avro(json: &Json, record: &RecordSchema, path: &str) -> Result<Avro, GatewayError> {
    let Json::Object(object) = json else {
        return Err(type_mismatch(path, "record object", json));
    };
    let mut fields = Vec::with_capacity(record.fields.len());
    for field in &record.fields {
        let field_path = child(path, &field.name);
        let value = match object.get(&field.name) {
            Some(value) => json_to_avro(value, &field.schema, &field_path)?,
            None => match &field.default {
                Some(default) => json_to_avro(default, &field.schema, &field_path)?,
                None => match &field.schema {
                    // A union with a null branch admits an absent field.
                    Schema::Union(union) => union_to_avro(&Json::Null, union, &field_path)?,
                    _ => {
                        return Err(GatewayError::TypeMismatch(format!(
                            "missing required field at {field_path}"
                        )))
                    }
                },
            },
        };
        fields.push((field.name.clone(), value));
    }
    // Fields not named by the schema are dropped: the transform stage has
    // already shaped the document.
    Ok(Avro::Record(fields))
}

fn bytes_from_json(json: &Json, path: &str) -> Result<Vec<u8>, GatewayError> {
    match json {
        Json::String(s) if BASE64_TEXT.is_match(s) => {
            base64::decode(s).map_err(|_| GatewayError::BytesTypeMismatch(path.to_string()))
        }
        Json::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| GatewayError::BytesTypeMismatch(path.to_string()))
            })
            .collect(),
        _ => Err(GatewayError::BytesTypeMismatch(path.to_string())),
    }
}

fn decimal_from_json(json: &Json, scale: usize, path: &str) -> Result<Avro, GatewayError> {
    match json {
        Json::Number(n) => decimal_from_text(&n.to_string(), scale, path),
        Json::String(s) if DECIMAL_TEXT.is_match(s) => decimal_from_text(s, scale, path),
        Json::String(s) if BASE64_TEXT.is_match(s) => {
            let bytes =
                base64::decode(s).map_err(|_| GatewayError::DecimalTypeMismatch(path.to_string()))?;
            Ok(Avro::Decimal(Decimal::from(bytes)))
        }
        Json::Array(items) => {
            let bytes: Vec<u8> = items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|b| u8::try_from(b).ok())
                        .ok_or_else(|| GatewayError::DecimalTypeMismatch(path.to_string()))
                })
                .collect::<Result<_, _>>()?;
            Ok(Avro::Decimal(Decimal::from(bytes)))
        }
        _ => Err(GatewayError::DecimalTypeMismatch(path.to_string())),
    }
}

fn decimal_from_text(text: &str, scale: usize, path: &str) -> Result<Avro, GatewayError> {
    let (int_part, frac_part) = match text.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (text, ""),
    };
    if frac_part.len() > scale {
        return Err(GatewayError::DecimalTypeMismatch(format!(
            "{path} (more fraction digits than scale {scale})"
        )));
    }
    let mut digits = String::with_capacity(int_part.len() + scale);
    digits.push_str(int_part);
    digits.push_str(frac_part);
    for _ in frac_part.len()..scale {
        digits.push('0');
    }
    let unscaled: i128 = digits
        .parse()
        .map_err(|_| GatewayError::DecimalTypeMismatch(path.to_string()))?;
    Ok(Avro::Decimal(Decimal::from(min_be_bytes(unscaled))))
}

// Shortest big-endian two's-complement representation of the unscaled value.
fn min_be_bytes(value: i128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant_zero = bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0;
        let redundant_ff = bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0;
        if redundant_zero || redundant_ff {
            start += 1;
        } else {
            break;
        }
    }
    bytes[start..].to_vec()
}

fn decimal_to_text(bytes: &[u8], scale: usize, path: &str) -> Result<String, GatewayError> {
    if bytes.len() > 16 {
        return Err(GatewayError::Decode(format!(
            "decimal at {path} is wider than 128 bits"
        )));
    }
    let fill = if bytes.first().map_or(false, |b| b & 0x80 != 0) {
        0xFF
    } else {
        0x00
    };
    let mut buf = [fill; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    let unscaled = i128::from_be_bytes(buf);
    if scale == 0 {
        return Ok(unscaled.to_string());
    }
    let magnitude = format!("{:0>width$}", unscaled.unsigned_abs(), width = scale + 1);
    let (int_part, frac_part) = magnitude.split_at(magnitude.len() - scale);
    let sign = if unscaled < 0 { "-" } else { "" };
    Ok(format!("{sign}{int_part}.{frac_part}"))
}

fn avro_to_json(value: &Avro, schema: &Schema, path: &str) -> Result<Json, GatewayError> {
    let mismatch = || {
        GatewayError::Decode(format!(
            "decoded value at {path} does not match the schema shape"
        ))
    };
    match (value, schema) {
        (Avro::Null, _) => Ok(Json::Null),
        (Avro::Boolean(b), _) => Ok(Json::Bool(*b)),
        (Avro::Int(i), _) => Ok(Json::from(*i)),
        (Avro::Long(l), _) => Ok(Json::from(*l)),
        (Avro::Float(f), _) => Number::from_f64(*f as f64)
            .map(Json::Number)
            .ok_or_else(|| GatewayError::Decode(format!("non-finite float at {path}"))),
        (Avro::Double(d), _) => Number::from_f64(*d)
            .map(Json::Number)
            .ok_or_else(|| GatewayError::Decode(format!("non-finite double at {path}"))),
        (Avro::String(s), _) => Ok(Json::String(s.clone())),
        (Avro::Bytes(b), _) => Ok(Json::String(base64::encode(b))),
        (Avro::Fixed(_, b), _) => Ok(Json::String(base64::encode(b))),
        (Avro::Enum(_, symbol), _) => Ok(Json::String(symbol.clone())),
        (Avro::Union(idx, inner), Schema::Union(union)) => {
            let variant = union.variants().get(*idx as usize).ok_or_else(mismatch)?;
            avro_to_json(inner, variant, path)
        }
        (Avro::Array(items), Schema::Array(array)) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                out.push(avro_to_json(item, &array.items, &child(path, &index.to_string()))?);
            }
            Ok(Json::Array(out))
        }
        (Avro::Map(entries), Schema::Map(map)) => {
            let mut keys: Vec<&String> = entries.keys().collect();
            keys.sort();
            let mut out = JsonMap::with_capacity(entries.len());
            for key in keys {
                out.insert(
                    key.clone(),
                    avro_to_json(&entries[key], &map.types, &child(path, key))?,
                );
            }
            Ok(Json::Object(out))
        }
        (Avro::Record(fields), Schema::Record(record)) => {
            let mut out = JsonMap::with_capacity(fields.len());
            for ((name, field_value), field) in fields.iter().zip(record.fields.iter()) {
                out.insert(
                    name.clone(),
                    avro_to_json(field_value, &field.schema, &child(path, name))?,
                );
            }
            Ok(Json::Object(out))
        }
        (Avro::Decimal(decimal), Schema::Decimal(DecimalSchema { scale, .. })) => {
            let bytes = <Vec<u8>>::try_from(decimal)
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
            decimal_to_text(&bytes, *scale, path).map(Json::String)
        }
        (Avro::Date(d), _) => Ok(Json::from(*d)),
        (Avro::TimeMillis(t), _) => Ok(Json::from(*t)),
        (Avro::TimeMicros(t), _) => Ok(Json::from(*t)),
        (Avro::TimestampMillis(t), _) => Ok(Json::from(*t)),
        (Avro::TimestampMicros(t), _) => Ok(Json::from(*t)),
        _ => Err(mismatch()),
    }
}
