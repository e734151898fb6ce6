use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::CoreError;

/// A top-level FHIR resource with a fixed `resourceType`.
pub trait FhirResource: Serialize + DeserializeOwned {
    const RESOURCE_TYPE: &'static str;

    fn to_json(&self) -> Result<Value, CoreError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Read the `resourceType` member of a raw resource.
pub fn resource_type_of(value: &Value) -> Option<&str> {
    value.get("resourceType").and_then(Value::as_str)
}

/// Decode a raw resource, checking its `resourceType` when present.
///
/// A missing `resourceType` is tolerated; a different one is not.
pub fn decode<T: FhirResource>(value: Value) -> Result<T, CoreError> {
    if let Some(actual) = resource_type_of(&value)
        && actual != T::RESOURCE_TYPE
    {
        return Err(CoreError::UnexpectedResourceType {
            expected: T::RESOURCE_TYPE.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(serde_json::from_value(value)?)
}
