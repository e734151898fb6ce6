use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::questionnaire::Questionnaire;
use super::value_set::ValueSet;
use crate::resource::{FhirResource, resource_type_of};

/// A resource embedded inline in another resource's `contained` list.
///
/// Resource types the engine does not model are carried through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainedResource {
    Questionnaire(Box<Questionnaire>),
    ValueSet(Box<ValueSet>),
    Other(Value),
}

impl ContainedResource {
    pub fn as_questionnaire(&self) -> Option<&Questionnaire> {
        match self {
            ContainedResource::Questionnaire(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_value_set(&self) -> Option<&ValueSet> {
        match self {
            ContainedResource::ValueSet(vs) => Some(vs),
            _ => None,
        }
    }
}

impl Serialize for ContainedResource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ContainedResource::Questionnaire(q) => q.serialize(serializer),
            ContainedResource::ValueSet(vs) => vs.serialize(serializer),
            ContainedResource::Other(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ContainedResource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let kind = resource_type_of(&value).map(str::to_string);
        match kind.as_deref() {
            Some(t) if t == Questionnaire::RESOURCE_TYPE => serde_json::from_value(value)
                .map(|q| ContainedResource::Questionnaire(Box::new(q)))
                .map_err(D::Error::custom),
            Some(t) if t == ValueSet::RESOURCE_TYPE => serde_json::from_value(value)
                .map(|vs| ContainedResource::ValueSet(Box::new(vs)))
                .map_err(D::Error::custom),
            _ => Ok(ContainedResource::Other(value)),
        }
    }
}

impl From<Questionnaire> for ContainedResource {
    fn from(q: Questionnaire) -> Self {
        ContainedResource::Questionnaire(Box::new(q))
    }
}
