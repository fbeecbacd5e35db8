//! Conversion between field values and their stored representation.
//!
//! Scalars are stored as-is (booleans as integers). Mappings and lists are
//! stored as JSON bytes and decoded back using the declared field type. Custom
//! types are checked against the affinity they resolve to in the registry.

use crate::affinity::{TypeAffinity, TypeRegistry};
use crate::model::FieldType;
use crate::{ModelDbError, Result, Value};
use std::collections::BTreeMap;

/// Check a value against a field type and convert it to its stored form
pub fn encode(field_type: &FieldType, value: &Value, registry: &TypeRegistry) -> Result<Value> {
    if value.is_null() {
        return if field_type.is_nullable() {
            Ok(Value::Null)
        } else {
            Err(mismatch(field_type, value))
        };
    }
    // SQLite stores a bound NaN as NULL.
    if let Value::Float64(v) = value
        && v.is_nan()
    {
        return Err(ModelDbError::Validation(format!(
            "NaN cannot be stored in a {} field",
            field_type
        )));
    }

    match (field_type.non_null(), value) {
        (FieldType::Int, Value::Int64(v)) => Ok(Value::Int64(*v)),
        (FieldType::Bool, Value::Bool(v)) => Ok(Value::Int64(*v as i64)),
        (FieldType::Float, Value::Float64(v)) => Ok(Value::Float64(*v)),
        (FieldType::Float, Value::Int64(v)) => Ok(Value::Float64(*v as f64)),
        (FieldType::Str, Value::String(v)) => Ok(Value::String(v.clone())),
        (FieldType::Bytes, Value::Bytes(v)) => Ok(Value::Bytes(v.clone())),
        (ty @ (FieldType::Dict(..) | FieldType::List(_)), v) => {
            let json = to_json(ty, v, registry)?;
            Ok(Value::Bytes(serde_json::to_vec(&json)?))
        }
        (ty @ FieldType::Custom(name), v) => {
            let affinity = custom_affinity(name, registry)?;
            custom_scalar(affinity, v).ok_or_else(|| mismatch(ty, v))
        }
        _ => Err(mismatch(field_type, value)),
    }
}

/// Convert a stored value back into a field value
pub fn decode(field_type: &FieldType, stored: Value, registry: &TypeRegistry) -> Result<Value> {
    if stored.is_null() {
        return if field_type.is_nullable() {
            Ok(Value::Null)
        } else {
            Err(ModelDbError::Validation(format!(
                "Unexpected NULL for non-optional {}",
                field_type
            )))
        };
    }

    match (field_type.non_null(), stored) {
        (FieldType::Int, Value::Int64(v)) => Ok(Value::Int64(v)),
        (FieldType::Bool, Value::Int64(v)) => Ok(Value::Bool(v != 0)),
        (FieldType::Float, Value::Float64(v)) => Ok(Value::Float64(v)),
        (FieldType::Float, Value::Int64(v)) => Ok(Value::Float64(v as f64)),
        (FieldType::Str, Value::String(v)) => Ok(Value::String(v)),
        (FieldType::Bytes, Value::Bytes(v)) => Ok(Value::Bytes(v)),
        (FieldType::Bytes, Value::String(v)) => Ok(Value::Bytes(v.into_bytes())),
        (ty @ (FieldType::Dict(..) | FieldType::List(_)), Value::Bytes(raw)) => {
            let json: serde_json::Value = serde_json::from_slice(&raw)?;
            from_json(ty, json, registry)
        }
        (ty @ (FieldType::Dict(..) | FieldType::List(_)), Value::String(raw)) => {
            let json: serde_json::Value = serde_json::from_str(&raw)?;
            from_json(ty, json, registry)
        }
        (FieldType::Custom(_), v) => Ok(v),
        (ty, v) => Err(ModelDbError::Validation(format!(
            "Stored {} cannot be read as {}",
            v.kind(),
            ty
        ))),
    }
}

fn mismatch(field_type: &FieldType, value: &Value) -> ModelDbError {
    ModelDbError::Validation(format!("Expected {}, found {}", field_type, value.kind()))
}

fn custom_affinity(name: &str, registry: &TypeRegistry) -> Result<TypeAffinity> {
    registry
        .lookup(name)
        .map(|sql_type| sql_type.affinity)
        .ok_or_else(|| {
            ModelDbError::Schema(format!("No SQL type registered for custom type '{}'", name))
        })
}

/// Stored form of a custom-typed scalar, if the value fits the affinity
fn custom_scalar(affinity: TypeAffinity, value: &Value) -> Option<Value> {
    match (affinity, value) {
        (TypeAffinity::Integer, Value::Int64(v)) => Some(Value::Int64(*v)),
        (TypeAffinity::Integer, Value::Bool(v)) => Some(Value::Int64(*v as i64)),
        (TypeAffinity::Real, Value::Float64(v)) => Some(Value::Float64(*v)),
        (TypeAffinity::Real, Value::Int64(v)) => Some(Value::Float64(*v as f64)),
        (TypeAffinity::Numeric, v @ (Value::Int64(_) | Value::Float64(_))) => Some(v.clone()),
        (TypeAffinity::Text, Value::String(v)) => Some(Value::String(v.clone())),
        (TypeAffinity::Blob, Value::Bytes(v)) => Some(Value::Bytes(v.clone())),
        _ => None,
    }
}

fn json_float(field_type: &FieldType, v: f64) -> Result<serde_json::Value> {
    serde_json::Number::from_f64(v)
        .map(serde_json::Value::Number)
        .ok_or_else(|| {
            ModelDbError::Validation(format!("{} value {} cannot be stored in JSON", field_type, v))
        })
}

fn to_json(
    field_type: &FieldType,
    value: &Value,
    registry: &TypeRegistry,
) -> Result<serde_json::Value> {
    if value.is_null() {
        return if field_type.is_nullable() {
            Ok(serde_json::Value::Null)
        } else {
            Err(mismatch(field_type, value))
        };
    }

    let json = match (field_type.non_null(), value) {
        (FieldType::Int, Value::Int64(v)) => serde_json::Value::from(*v),
        (FieldType::Bool, Value::Bool(v)) => serde_json::Value::from(*v),
        (ty @ FieldType::Float, Value::Float64(v)) => json_float(ty, *v)?,
        (FieldType::Float, Value::Int64(v)) => json_float(field_type, *v as f64)?,
        (FieldType::Str, Value::String(v)) => serde_json::Value::from(v.as_str()),
        (FieldType::Bytes, Value::Bytes(v)) => serde_json::Value::from(v.clone()),
        (FieldType::Dict(_, value_type), Value::Map(map)) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), to_json(value_type, v, registry)?);
            }
            serde_json::Value::Object(out)
        }
        (FieldType::List(item_type), Value::List(items)) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| to_json(item_type, item, registry))
                .collect::<Result<Vec<_>>>()?,
        ),
        (ty @ FieldType::Custom(name), v) => {
            let affinity = custom_affinity(name, registry)?;
            match custom_scalar(affinity, v).ok_or_else(|| mismatch(ty, v))? {
                Value::Int64(i) => serde_json::Value::from(i),
                Value::Float64(f) => json_float(ty, f)?,
                Value::String(s) => serde_json::Value::from(s),
                Value::Bytes(b) => serde_json::Value::from(b),
                other => return Err(mismatch(ty, &other)),
            }
        }
        _ => return Err(mismatch(field_type, value)),
    };
    Ok(json)
}

fn from_json(
    field_type: &FieldType,
    json: serde_json::Value,
    registry: &TypeRegistry,
) -> Result<Value> {
    use serde_json::Value as Json;

    let bad = |json: &Json| {
        ModelDbError::Validation(format!("Stored JSON {} is not a valid {}", json, field_type))
    };

    if json.is_null() {
        return if field_type.is_nullable() {
            Ok(Value::Null)
        } else {
            Err(bad(&json))
        };
    }

    match (field_type.non_null(), json) {
        (FieldType::Int, json) => json.as_i64().map(Value::Int64).ok_or_else(|| bad(&json)),
        (FieldType::Bool, json) => json.as_bool().map(Value::Bool).ok_or_else(|| bad(&json)),
        (FieldType::Float, json) => json.as_f64().map(Value::Float64).ok_or_else(|| bad(&json)),
        (FieldType::Str, Json::String(s)) => Ok(Value::String(s)),
        (FieldType::Bytes, Json::Array(items)) => json_bytes(&items)
            .map(Value::Bytes)
            .ok_or_else(|| bad(&Json::Array(items))),
        (FieldType::Dict(_, value_type), Json::Object(map)) => {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                out.insert(k, from_json(value_type, v, registry)?);
            }
            Ok(Value::Map(out))
        }
        (FieldType::List(item_type), Json::Array(items)) => Ok(Value::List(
            items
                .into_iter()
                .map(|item| from_json(item_type, item, registry))
                .collect::<Result<Vec<_>>>()?,
        )),
        (FieldType::Custom(name), json) => {
            let value = match (custom_affinity(name, registry)?, &json) {
                (TypeAffinity::Integer, _) => json.as_i64().map(Value::Int64),
                (TypeAffinity::Real, _) => json.as_f64().map(Value::Float64),
                (TypeAffinity::Numeric, _) => json
                    .as_i64()
                    .map(Value::Int64)
                    .or_else(|| json.as_f64().map(Value::Float64)),
                (TypeAffinity::Text, Json::String(s)) => Some(Value::String(s.clone())),
                (TypeAffinity::Blob, Json::Array(items)) => json_bytes(items).map(Value::Bytes),
                _ => None,
            };
            value.ok_or_else(|| bad(&json))
        }
        (_, json) => Err(bad(&json)),
    }
}

fn json_bytes(items: &[serde_json::Value]) -> Option<Vec<u8>> {
    items
        .iter()
        .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn str_dict() -> FieldType {
        FieldType::Dict(Box::new(FieldType::Str), Box::new(FieldType::Str))
    }

    fn builtin() -> &'static TypeRegistry {
        TypeRegistry::builtin()
    }

    #[test]
    fn dict_is_stored_as_json_bytes() {
        let mut map = BTreeMap::new();
        map.insert("k".to_string(), Value::String("v".into()));
        let stored = encode(&str_dict(), &Value::Map(map.clone()), builtin()).unwrap();
        assert_eq!(stored, Value::Bytes(br#"{"k":"v"}"#.to_vec()));
        assert_eq!(decode(&str_dict(), stored, builtin()).unwrap(), Value::Map(map));
    }

    #[test]
    fn dict_value_type_is_checked() {
        let mut map = BTreeMap::new();
        map.insert("k".to_string(), Value::Int64(1));
        let err = encode(&str_dict(), &Value::Map(map), builtin()).unwrap_err();
        assert!(matches!(err, ModelDbError::Validation(_)));
    }

    #[test]
    fn null_only_for_optional() {
        assert!(encode(&FieldType::Int, &Value::Null, builtin()).is_err());
        let optional = FieldType::Optional(Box::new(FieldType::Int));
        assert_eq!(encode(&optional, &Value::Null, builtin()).unwrap(), Value::Null);
        assert_eq!(decode(&optional, Value::Null, builtin()).unwrap(), Value::Null);
        assert!(decode(&FieldType::Int, Value::Null, builtin()).is_err());
    }

    #[test]
    fn bool_is_stored_as_integer() {
        assert_eq!(
            encode(&FieldType::Bool, &Value::Bool(true), builtin()).unwrap(),
            Value::Int64(1)
        );
        assert_eq!(
            decode(&FieldType::Bool, Value::Int64(0), builtin()).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn nested_list_of_optional_floats() {
        let ty = FieldType::List(Box::new(FieldType::Optional(Box::new(FieldType::Float))));
        let value = Value::List(vec![Value::Float64(1.5), Value::Null]);
        let stored = encode(&ty, &value, builtin()).unwrap();
        assert_eq!(stored, Value::Bytes(b"[1.5,null]".to_vec()));
        assert_eq!(decode(&ty, stored, builtin()).unwrap(), value);
    }

    #[test]
    fn non_finite_floats_are_rejected_inside_json() {
        let ty = FieldType::Dict(Box::new(FieldType::Str), Box::new(FieldType::Float));
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut map = BTreeMap::new();
            map.insert("x".to_string(), Value::Float64(bad));
            let err = encode(&ty, &Value::Map(map), builtin()).unwrap_err();
            assert!(matches!(err, ModelDbError::Validation(_)), "{bad} accepted");
        }
    }

    #[test]
    fn scalar_nan_is_rejected_but_infinity_is_kept() {
        let err = encode(&FieldType::Float, &Value::Float64(f64::NAN), builtin()).unwrap_err();
        assert!(matches!(err, ModelDbError::Validation(_)));
        assert_eq!(
            encode(&FieldType::Float, &Value::Float64(f64::INFINITY), builtin()).unwrap(),
            Value::Float64(f64::INFINITY)
        );
    }

    #[test]
    fn custom_items_follow_their_resolved_affinity() {
        let registry = TypeRegistry::new();
        registry.register_alias("uuid", "str");
        let ty = FieldType::List(Box::new(FieldType::Custom("uuid".into())));

        let value = Value::List(vec![Value::String("abc".into())]);
        let stored = encode(&ty, &value, &registry).unwrap();
        assert_eq!(stored, Value::Bytes(br#"["abc"]"#.to_vec()));
        assert_eq!(decode(&ty, stored, &registry).unwrap(), value);

        let err = encode(&ty, &Value::List(vec![Value::Int64(1)]), &registry).unwrap_err();
        assert!(matches!(err, ModelDbError::Validation(_)));
    }

    #[test]
    fn custom_blob_items_round_trip_as_bytes() {
        let registry = TypeRegistry::new();
        registry.register_alias("digest", "bytes");
        let ty = FieldType::Dict(
            Box::new(FieldType::Str),
            Box::new(FieldType::Custom("digest".into())),
        );
        let mut map = BTreeMap::new();
        map.insert("sha".to_string(), Value::Bytes(vec![1, 2, 255]));

        let stored = encode(&ty, &Value::Map(map.clone()), &registry).unwrap();
        assert_eq!(decode(&ty, stored, &registry).unwrap(), Value::Map(map));
    }

    #[test]
    fn unresolved_custom_type_is_a_schema_error() {
        let ty = FieldType::List(Box::new(FieldType::Custom("never_registered".into())));
        let err = encode(&ty, &Value::List(vec![Value::Int64(1)]), builtin()).unwrap_err();
        assert!(matches!(err, ModelDbError::Schema(_)));
    }

    #[test]
    fn top_level_custom_checks_affinity() {
        let registry = TypeRegistry::new();
        registry.register_alias("uuid", "str");
        let ty = FieldType::Custom("uuid".into());
        assert_eq!(
            encode(&ty, &Value::String("abc".into()), &registry).unwrap(),
            Value::String("abc".into())
        );
        assert!(encode(&ty, &Value::Bytes(vec![1]), &registry).is_err());
    }

    #[test]
    fn wrong_scalar_is_rejected() {
        let err = encode(&FieldType::Bytes, &Value::String("x".into()), builtin()).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Expected bytes, found str");
    }
}
