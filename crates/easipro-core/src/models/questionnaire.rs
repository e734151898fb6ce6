use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::contained::ContainedResource;
use super::datatypes::{Coding, Extension, Reference, find_extension};
use super::response::AnswerValue;
use super::value_set::ValueSet;
use crate::error::CoreError;
use crate::resource::FhirResource;

fn questionnaire_type() -> String {
    Questionnaire::RESOURCE_TYPE.to_string()
}

/// A FHIR Questionnaire. Immutable once fetched from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Questionnaire {
    #[serde(default = "questionnaire_type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_type: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code: Vec<Coding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contained: Vec<ContainedResource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Questionnaire {
    fn default() -> Self {
        Self {
            resource_type: questionnaire_type(),
            id: None,
            url: None,
            title: None,
            status: None,
            subject_type: Vec::new(),
            code: Vec::new(),
            extension: Vec::new(),
            contained: Vec::new(),
            item: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl FhirResource for Questionnaire {
    const RESOURCE_TYPE: &'static str = "Questionnaire";
}

impl Questionnaire {
    /// Snapshot of the identifying fields with no items, as embedded in a
    /// fresh adaptive QuestionnaireResponse.
    pub fn snapshot(&self) -> Self {
        Self {
            id: self.id.clone(),
            url: self.url.clone(),
            title: self.title.clone(),
            status: self.status.clone(),
            subject_type: self.subject_type.clone(),
            ..Default::default()
        }
    }

    pub fn extension(&self, url: &str) -> Option<&Extension> {
        find_extension(&self.extension, url)
    }

    pub fn first_item(&self) -> Option<&QuestionnaireItem> {
        self.item.first()
    }

    /// Depth-first lookup of an item by `linkId`.
    pub fn item_by_link_id(&self, link_id: &str) -> Option<&QuestionnaireItem> {
        fn walk<'a>(
            items: &'a [QuestionnaireItem],
            link_id: &str,
        ) -> Option<&'a QuestionnaireItem> {
            items.iter().find_map(|item| {
                if item.link_id.as_deref() == Some(link_id) {
                    Some(item)
                } else {
                    walk(&item.item, link_id)
                }
            })
        }
        walk(&self.item, link_id)
    }

    /// Contained ValueSet addressed by a local (`#id`) or canonical reference.
    pub fn contained_value_set(&self, reference: &str) -> Option<&ValueSet> {
        let local_id = reference.strip_prefix('#');
        self.contained
            .iter()
            .filter_map(ContainedResource::as_value_set)
            .find(|vs| match local_id {
                Some(id) => vs.id.as_deref() == Some(id),
                None => vs.url.as_deref() == Some(reference),
            })
    }

    /// Resolve the selectable codings for a choice item, from inline answer
    /// options or a contained ValueSet.
    pub fn answer_choices(&self, item: &QuestionnaireItem) -> Result<Vec<Coding>, CoreError> {
        let mut choices: Vec<Coding> = item
            .answer_option
            .iter()
            .filter_map(AnswerOption::as_coding)
            .collect();

        if choices.is_empty()
            && let Some(reference) = item.value_set_reference()
            && let Some(value_set) = self.contained_value_set(reference)
        {
            choices = value_set.codings();
        }

        if choices.is_empty() {
            return Err(CoreError::MissingAnswerOptions {
                link_id: item.link_id.clone().unwrap_or_default(),
            });
        }
        Ok(choices)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemType {
    Group,
    Display,
    Boolean,
    Decimal,
    Integer,
    Date,
    #[serde(rename = "dateTime")]
    DateTime,
    Time,
    String,
    Text,
    Url,
    Choice,
    OpenChoice,
    Attachment,
    Reference,
    Quantity,
    #[serde(other)]
    Unknown,
}

impl ItemType {
    pub fn is_question(self) -> bool {
        !matches!(self, ItemType::Group | ItemType::Display)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<ItemType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeats: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code: Vec<Coding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(default, alias = "option", skip_serializing_if = "Vec::is_empty")]
    pub answer_option: Vec<AnswerOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_value_set: Option<String>,
    /// STU3 form of `answerValueSet`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enable_when: Vec<EnableWhen>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_behavior: Option<EnableBehavior>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item: Vec<QuestionnaireItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QuestionnaireItem {
    pub fn value_set_reference(&self) -> Option<&str> {
        self.answer_value_set
            .as_deref()
            .or_else(|| self.options.as_ref().and_then(|r| r.reference.as_deref()))
    }

    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }

    pub fn allows_multiple(&self) -> bool {
        self.repeats.unwrap_or(false)
    }
}

/// An inline answer option. The `value[x]` member is kept raw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_selected: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
    #[serde(flatten)]
    pub value: Map<String, Value>,
}

impl AnswerOption {
    pub fn from_coding(coding: Coding) -> Self {
        let mut value = Map::new();
        AnswerValue::Coding(coding).insert_into(&mut value, "value");
        Self {
            value,
            ..Default::default()
        }
    }

    /// The option as a coding; plain string and integer options become a
    /// system-less coding whose code is the literal value.
    pub fn as_coding(&self) -> Option<Coding> {
        match AnswerValue::from_fields(&self.value, "value")? {
            AnswerValue::Coding(c) => Some(c),
            AnswerValue::String(s) => Some(Coding::new(None, &s, Some(&s))),
            AnswerValue::Integer(n) => Some(Coding::new(None, &n.to_string(), None)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnableBehavior {
    All,
    Any,
}

/// A conditional-display rule. `answer[x]` and the STU3 `hasAnswer` are kept
/// raw alongside any other members.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnableWhen {
    #[serde(default)]
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl EnableWhen {
    pub fn answer(&self) -> Option<AnswerValue> {
        AnswerValue::from_fields(&self.fields, "answer")
    }

    /// Operator, mapping STU3 `hasAnswer` onto `exists`.
    pub fn effective_operator(&self) -> &str {
        match self.operator.as_deref() {
            Some(op) => op,
            None if self.fields.contains_key("hasAnswer") => "exists",
            None => "=",
        }
    }

    /// Expected answer presence for the `exists` operator.
    pub fn expects_answer(&self) -> bool {
        self.fields
            .get("answerBoolean")
            .or_else(|| self.fields.get("hasAnswer"))
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}
