use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::contained::ContainedResource;
use super::datatypes::{Coding, Extension, find_extension};
use super::questionnaire::{Questionnaire, QuestionnaireItem};
use crate::error::CoreError;
use crate::resource::FhirResource;

fn response_type() -> String {
    QuestionnaireResponse::RESOURCE_TYPE.to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseStatus {
    #[default]
    InProgress,
    Completed,
    Amended,
    EnteredInError,
    Stopped,
    #[serde(other)]
    Unknown,
}

/// Answers for one adaptive round trip, or for a whole static questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireResponse {
    #[serde(default = "response_type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authored: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questionnaire: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contained: Vec<ContainedResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<ResponseItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for QuestionnaireResponse {
    fn default() -> Self {
        Self {
            resource_type: response_type(),
            id: None,
            status: ResponseStatus::default(),
            authored: None,
            questionnaire: None,
            contained: Vec::new(),
            extension: Vec::new(),
            item: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl FhirResource for QuestionnaireResponse {
    const RESOURCE_TYPE: &'static str = "QuestionnaireResponse";
}

impl QuestionnaireResponse {
    pub fn is_completed(&self) -> bool {
        self.status == ResponseStatus::Completed
    }

    pub fn authored_at(&self) -> Option<jiff::Timestamp> {
        self.authored.as_deref().and_then(|a| a.parse().ok())
    }

    /// The contained Questionnaire describing what to ask next.
    pub fn contained_questionnaire(&self) -> Option<&Questionnaire> {
        self.contained
            .iter()
            .find_map(ContainedResource::as_questionnaire)
    }

    /// Replace the contained Questionnaire, keeping other contained resources.
    pub fn set_contained_questionnaire(&mut self, questionnaire: Questionnaire) {
        self.contained
            .retain(|r| !matches!(r, ContainedResource::Questionnaire(_)));
        self.contained.insert(0, questionnaire.into());
    }

    /// First item of the contained Questionnaire.
    pub fn next_item(&self) -> Option<&QuestionnaireItem> {
        self.contained_questionnaire().and_then(Questionnaire::first_item)
    }

    pub fn extension(&self, url: &str) -> Option<&Extension> {
        find_extension(&self.extension, url)
    }

    pub fn has_answer_for(&self, link_id: &str) -> bool {
        self.item.iter().any(|i| i.link_id == link_id)
    }

    /// Append an answered item. A `linkId` may appear at most once.
    pub fn push_item(&mut self, item: ResponseItem) -> Result<(), CoreError> {
        if self.has_answer_for(&item.link_id) {
            return Err(CoreError::DuplicateAnswer {
                link_id: item.link_id,
            });
        }
        self.item.push(item);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseItem {
    #[serde(default)]
    pub link_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answer: Vec<Answer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<ResponseItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResponseItem {
    pub fn new(link_id: impl Into<String>) -> Self {
        Self {
            link_id: link_id.into(),
            ..Default::default()
        }
    }

    pub fn with_answer(mut self, value: AnswerValue) -> Self {
        self.answer.push(Answer::new(value));
        self
    }

    pub fn answer_values(&self) -> Vec<AnswerValue> {
        self.answer.iter().filter_map(Answer::value).collect()
    }
}

/// One answer. Holds the `value[x]` member, plus anything else the server
/// sent, as raw JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Answer {
    pub fn new(value: AnswerValue) -> Self {
        let mut fields = Map::new();
        value.insert_into(&mut fields, "value");
        Self { fields }
    }

    pub fn value(&self) -> Option<AnswerValue> {
        AnswerValue::from_fields(&self.fields, "value")
    }
}

/// Typed view of a FHIR `value[x]` / `answer[x]` member.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerValue {
    Boolean(bool),
    Decimal(f64),
    Integer(i64),
    Date(String),
    DateTime(String),
    Time(String),
    String(String),
    Uri(String),
    Coding(Coding),
}

impl AnswerValue {
    fn suffix(&self) -> &'static str {
        match self {
            AnswerValue::Boolean(_) => "Boolean",
            AnswerValue::Decimal(_) => "Decimal",
            AnswerValue::Integer(_) => "Integer",
            AnswerValue::Date(_) => "Date",
            AnswerValue::DateTime(_) => "DateTime",
            AnswerValue::Time(_) => "Time",
            AnswerValue::String(_) => "String",
            AnswerValue::Uri(_) => "Uri",
            AnswerValue::Coding(_) => "Coding",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AnswerValue::Boolean(b) => Value::Bool(*b),
            AnswerValue::Decimal(d) => serde_json::Number::from_f64(*d)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            AnswerValue::Integer(i) => Value::Number((*i).into()),
            AnswerValue::Date(s)
            | AnswerValue::DateTime(s)
            | AnswerValue::Time(s)
            | AnswerValue::String(s)
            | AnswerValue::Uri(s) => Value::String(s.clone()),
            AnswerValue::Coding(c) => serde_json::to_value(c).unwrap_or(Value::Null),
        }
    }

    /// Write as `{prefix}{Type}` (e.g. `valueBoolean`) into a JSON object.
    pub fn insert_into(&self, fields: &mut Map<String, Value>, prefix: &str) {
        fields.insert(format!("{prefix}{}", self.suffix()), self.to_json());
    }

    /// Read the first recognised `{prefix}{Type}` member of a JSON object.
    pub fn from_fields(fields: &Map<String, Value>, prefix: &str) -> Option<Self> {
        fields.iter().find_map(|(key, value)| {
            let suffix = key.strip_prefix(prefix)?;
            match suffix {
                "Boolean" => value.as_bool().map(AnswerValue::Boolean),
                "Decimal" => value.as_f64().map(AnswerValue::Decimal),
                "Integer" => value.as_i64().map(AnswerValue::Integer),
                "Date" => value.as_str().map(|s| AnswerValue::Date(s.to_string())),
                "DateTime" => value.as_str().map(|s| AnswerValue::DateTime(s.to_string())),
                "Time" => value.as_str().map(|s| AnswerValue::Time(s.to_string())),
                "String" => value.as_str().map(|s| AnswerValue::String(s.to_string())),
                "Uri" => value.as_str().map(|s| AnswerValue::Uri(s.to_string())),
                "Coding" => serde_json::from_value(value.clone())
                    .ok()
                    .map(AnswerValue::Coding),
                _ => None,
            }
        })
    }
}
