use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::resource::{FhirResource, resource_type_of};

fn bundle_type() -> String {
    Bundle::RESOURCE_TYPE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    #[serde(default = "bundle_type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub bundle_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FhirResource for Bundle {
    const RESOURCE_TYPE: &'static str = "Bundle";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Bundle {
    /// A `collection` bundle holding the given resources, each addressed by
    /// a `urn:uuid` full URL.
    pub fn collection<T: FhirResource>(resources: &[T]) -> Result<Self, CoreError> {
        let entry = resources
            .iter()
            .map(|r| {
                Ok(BundleEntry {
                    full_url: Some(format!("urn:uuid:{}", uuid::Uuid::new_v4())),
                    resource: Some(r.to_json()?),
                    ..Default::default()
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        Ok(Self {
            resource_type: bundle_type(),
            id: Some(uuid::Uuid::new_v4().to_string()),
            bundle_type: Some("collection".to_string()),
            total: None,
            entry,
            extra: Map::new(),
        })
    }

    /// Decode every entry of type `T`, skipping entries of other types.
    pub fn resources<T: FhirResource>(&self) -> Result<Vec<T>, CoreError> {
        self.entry
            .iter()
            .filter_map(|e| e.resource.as_ref())
            .filter(|r| resource_type_of(r) == Some(T::RESOURCE_TYPE))
            .map(|r| Ok(serde_json::from_value(r.clone())?))
            .collect()
    }
}
