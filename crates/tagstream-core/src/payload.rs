//! Typed payload contract
//!
//! Event payloads and per-tag state payloads are closed sum types. Each
//! variant is identified on the wire by its type name, carried next to the
//! data rather than inside it:
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use tagstream_core::payload::{decode_payload, encode_payload, TypedPayload};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! #[serde(tag = "type", content = "data")]
//! enum CartEvent {
//!     ItemAdded { id: u32, price: u64 },
//!     Cleared,
//! }
//!
//! impl TypedPayload for CartEvent {
//!     const TYPE_NAMES: &'static [&'static str] = &["ItemAdded", "Cleared"];
//! }
//!
//! let (type_name, data) = encode_payload(&CartEvent::ItemAdded { id: 1, price: 100 }).unwrap();
//! assert_eq!(type_name, "ItemAdded");
//! let back: CartEvent = decode_payload(&type_name, &data).unwrap().unwrap();
//! assert_eq!(back, CartEvent::ItemAdded { id: 1, price: 100 });
//! assert!(decode_payload::<CartEvent>("SomethingElse", &data).is_none());
//! ```

use crate::error::{Result, TagstreamError, ValidationError};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

const TYPE_FIELD: &str = "type";
const DATA_FIELD: &str = "data";

/// A closed set of payload variants that round-trips through a type name
/// plus a JSON body.
///
/// Implementors must use serde's adjacent representation,
/// `#[serde(tag = "type", content = "data")]`, and list every variant name
/// in `TYPE_NAMES`.
pub trait TypedPayload: Serialize + DeserializeOwned {
    const TYPE_NAMES: &'static [&'static str];

    fn is_known_type(type_name: &str) -> bool {
        Self::TYPE_NAMES.contains(&type_name)
    }
}

/// Split a payload into its type name and body.
pub fn encode_payload<P: TypedPayload>(payload: &P) -> Result<(String, Value)> {
    let value = serde_json::to_value(payload)?;
    let Value::Object(mut fields) = value else {
        return Err(TagstreamError::Serialization(
            "typed payload must serialize to an adjacently tagged object".into(),
        ));
    };
    let type_name = match fields.remove(TYPE_FIELD) {
        Some(Value::String(name)) => name,
        _ => {
            return Err(TagstreamError::Serialization(format!(
                "typed payload is missing its '{TYPE_FIELD}' field"
            )))
        }
    };
    if !P::is_known_type(&type_name) {
        return Err(ValidationError::UnknownPayloadType(type_name).into());
    }
    let data = fields.remove(DATA_FIELD).unwrap_or(Value::Null);
    Ok((type_name, data))
}

/// Rebuild a payload from its type name and body.
///
/// Returns `None` when `type_name` is not one of `P`'s variants, so foreign
/// payloads are filtered out before they reach a projector. A known type
/// whose body does not decode is `Some(Err(..))`.
pub fn decode_payload<P: TypedPayload>(type_name: &str, data: &Value) -> Option<Result<P>> {
    if !P::is_known_type(type_name) {
        return None;
    }
    let mut fields = Map::with_capacity(2);
    fields.insert(TYPE_FIELD.to_string(), Value::String(type_name.to_string()));
    if !data.is_null() {
        fields.insert(DATA_FIELD.to_string(), data.clone());
    }
    Some(serde_json::from_value(Value::Object(fields)).map_err(TagstreamError::from))
}
