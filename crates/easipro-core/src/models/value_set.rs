use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::datatypes::Coding;
use crate::resource::FhirResource;

fn value_set_type() -> String {
    ValueSet::RESOURCE_TYPE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSet {
    #[serde(default = "value_set_type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compose: Option<ValueSetCompose>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expansion: Option<ValueSetExpansion>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FhirResource for ValueSet {
    const RESOURCE_TYPE: &'static str = "ValueSet";
}

impl ValueSet {
    /// All codings, preferring the expansion over the compose definition.
    pub fn codings(&self) -> Vec<Coding> {
        if let Some(expansion) = &self.expansion
            && !expansion.contains.is_empty()
        {
            return expansion.contains.clone();
        }

        self.compose
            .iter()
            .flat_map(|c| &c.include)
            .flat_map(|include| {
                include.concept.iter().map(|concept| Coding {
                    system: include.system.clone(),
                    code: Some(concept.code.clone()),
                    display: concept.display.clone(),
                    ..Default::default()
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueSetCompose {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<ConceptSetInclude>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptSetInclude {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concept: Vec<ConceptReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptReference {
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueSetExpansion {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contains: Vec<Coding>,
}
