//! The schema-validated record codec.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{CodecError, Decode, Encode};

/// Wraps a `T` that is serialized as JSON and validated against `T`'s derived JSON
/// Schema on both encode and decode.
///
/// `T` must derive `serde::Serialize`, `serde::Deserialize` and
/// `schemars::JsonSchema`. The schema is generated once per `T` and cached.
#[derive(Debug, Clone, derive_more::Deref, derive_more::DerefMut)]
pub struct Record<T>(pub T);

/// Global cache of compiled schemas, keyed by `TypeId` rather than a per-`T` static:
/// a function-local `static` inside a generic function is still a single item for
/// the whole program (its type doesn't mention `T`), so it cannot hold one cell per
/// record type. Values are `Arc<jsonschema::JSONSchema>` behind `dyn Any`.
fn schema_cache() -> &'static Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>> {
    static CACHE: OnceLock<Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns the compiled schema for `T`, compiling and caching it on first use.
fn compiled_schema_for<T: JsonSchema + 'static>() -> Arc<jsonschema::JSONSchema> {
    let mut cache = schema_cache().lock().expect("schema cache mutex poisoned");
    let entry = cache.entry(TypeId::of::<T>()).or_insert_with(|| {
        let schema = schema_for!(T);
        let schema_value =
            serde_json::to_value(&schema).expect("derived JSON Schema always serializes");
        let compiled = jsonschema::JSONSchema::compile(&schema_value)
            .expect("schemars-derived schema is always a valid JSON Schema document");
        Arc::new(compiled) as Arc<dyn Any + Send + Sync>
    });

    entry
        .clone()
        .downcast::<jsonschema::JSONSchema>()
        .expect("cache entry for this TypeId was inserted as Arc<JSONSchema>")
}

fn validate<T: JsonSchema + 'static>(value: &serde_json::Value) -> Result<(), CodecError> {
    compiled_schema_for::<T>().validate(value).map_err(|errors| {
        let messages: Vec<String> = errors.map(|e| e.to_string()).collect();
        CodecError::SchemaViolation(messages.join("; "))
    })
}

impl<T> Decode for Record<T>
where
    T: DeserializeOwned + JsonSchema + 'static,
{
    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        validate::<T>(&value)?;
        let record = serde_json::from_value(value)?;
        Ok(Record(record))
    }
}

impl<T> Encode for Record<T>
where
    T: Serialize + JsonSchema + 'static,
{
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let value = serde_json::to_value(&self.0)?;
        validate::<T>(&value)?;
        Ok(serde_json::to_vec(&value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
    struct Double {
        value: i64,
    }

    #[test]
    fn record_round_trips_when_schema_conformant() {
        let record = Record(Double { value: 5 });
        let encoded = record.encode().unwrap();
        let decoded: Record<Double> = Record::decode(&encoded).unwrap();
        assert_eq!(decoded.0, Double { value: 5 });
    }

    #[test]
    fn record_decode_rejects_schema_violations() {
        // `value` is required and must be an integer; send a string instead.
        let bad = br#"{"value": "not-a-number"}"#;
        let result = Record::<Double>::decode(bad);
        assert!(matches!(result, Err(CodecError::SchemaViolation(_))));
    }

    #[test]
    fn record_decode_rejects_missing_required_fields() {
        let bad = br#"{}"#;
        let result = Record::<Double>::decode(bad);
        assert!(matches!(result, Err(CodecError::SchemaViolation(_))));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
    struct Greeting {
        name: String,
    }

    /// Two distinct record types must each get their own cached schema: a
    /// value valid under `Greeting`'s schema but not `Double`'s (and vice versa)
    /// must be judged independently, not against whichever schema was compiled
    /// first.
    #[test]
    fn distinct_record_types_get_independent_schemas() {
        let doubled = Record(Double { value: 5 });
        let doubled_encoded = doubled.encode().unwrap();
        let doubled_decoded: Record<Double> = Record::decode(&doubled_encoded).unwrap();
        assert_eq!(doubled_decoded.0, Double { value: 5 });

        let greeting = Record(Greeting {
            name: "ada".to_string(),
        });
        let greeting_encoded = greeting.encode().unwrap();
        let greeting_decoded: Record<Greeting> = Record::decode(&greeting_encoded).unwrap();
        assert_eq!(greeting_decoded.0, Greeting { name: "ada".to_string() });

        assert!(matches!(
            Record::<Double>::decode(&greeting_encoded),
            Err(CodecError::SchemaViolation(_))
        ));
        assert!(matches!(
            Record::<Greeting>::decode(&doubled_encoded),
            Err(CodecError::SchemaViolation(_))
        ));
    }
}
