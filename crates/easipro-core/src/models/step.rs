//! Step and result vocabulary shared with task runners.
//!
//! A task runner presents [`Step`]s one at a time and records what the
//! participant entered as [`StepResult`]s in a [`TaskResult`]. The instrument
//! side reads those results back by step identifier.

use serde::{Deserialize, Serialize};

use super::datatypes::Coding;
use super::questionnaire::QuestionnaireItem;
use crate::error::CoreError;

/// Separator between system, code and display in an encoded choice value.
pub const CHOICE_DELIMITER: char = '≠';

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub identifier: String,
    pub title: Option<String>,
    pub text: Option<String>,
    pub kind: StepKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Text only; never captures an answer.
    Instruction,
    Question {
        item: Box<QuestionnaireItem>,
        choices: Vec<ChoiceOption>,
    },
    /// Terminal step shown when the task is over.
    Completion,
}

impl Step {
    pub fn instruction(identifier: &str, title: Option<String>, text: Option<String>) -> Self {
        Self {
            identifier: identifier.to_string(),
            title,
            text,
            kind: StepKind::Instruction,
        }
    }

    pub fn completion(identifier: &str, title: Option<String>, text: Option<String>) -> Self {
        Self {
            identifier: identifier.to_string(),
            title,
            text,
            kind: StepKind::Completion,
        }
    }

    /// A question step identified by the item's `linkId`.
    pub fn question(
        item: QuestionnaireItem,
        choices: Vec<ChoiceOption>,
    ) -> Result<Self, CoreError> {
        let identifier = item
            .link_id
            .clone()
            .ok_or_else(|| CoreError::MissingField("Questionnaire.item.linkId".to_string()))?;
        Ok(Self {
            identifier,
            title: None,
            text: item.text.clone(),
            kind: StepKind::Question {
                item: Box::new(item),
                choices,
            },
        })
    }

    pub fn item(&self) -> Option<&QuestionnaireItem> {
        match &self.kind {
            StepKind::Question { item, .. } => Some(item),
            _ => None,
        }
    }

    pub fn is_completion(&self) -> bool {
        matches!(self.kind, StepKind::Completion)
    }
}

/// A selectable answer: the label shown and the encoded value recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub label: String,
    pub value: String,
}

impl From<&Coding> for ChoiceOption {
    fn from(coding: &Coding) -> Self {
        Self {
            label: coding.label().to_string(),
            value: encode_choice(coding),
        }
    }
}

/// Encode a coding as `system≠code≠display` (display omitted when absent).
pub fn encode_choice(coding: &Coding) -> String {
    let system = coding.system.as_deref().unwrap_or_default();
    let code = coding.code.as_deref().unwrap_or_default();
    match coding.display.as_deref() {
        Some(display) => format!("{system}{CHOICE_DELIMITER}{code}{CHOICE_DELIMITER}{display}"),
        None => format!("{system}{CHOICE_DELIMITER}{code}"),
    }
}

/// Decode a value produced by [`encode_choice`] back into a coding.
pub fn decode_choice(value: &str) -> Result<Coding, CoreError> {
    let mut parts = value.splitn(3, CHOICE_DELIMITER);
    let system = parts.next().unwrap_or_default();
    let code = parts
        .next()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| CoreError::InvalidChoice(value.to_string()))?;
    let display = parts.next().filter(|d| !d.is_empty());

    Ok(Coding::new(
        Some(system).filter(|s| !s.is_empty()),
        code,
        display,
    ))
}

/// What a participant entered for one question step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StepAnswer {
    Boolean(bool),
    Date(jiff::civil::Date),
    DateTime(jiff::Timestamp),
    /// Integer or decimal; the item's declared type decides which.
    Numeric(f64),
    Text(String),
    /// Encoded choice values, see [`encode_choice`].
    Choice(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub identifier: String,
    /// `None` when the step was skipped.
    pub answer: Option<StepAnswer>,
    pub recorded_at: jiff::Timestamp,
}

impl StepResult {
    pub fn new(identifier: impl Into<String>, answer: Option<StepAnswer>) -> Self {
        Self {
            identifier: identifier.into(),
            answer,
            recorded_at: jiff::Timestamp::now(),
        }
    }
}

/// Captured results of a task run, readable by step identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub results: Vec<StepResult>,
}

impl TaskResult {
    /// Record a result, replacing any earlier result for the same step.
    pub fn record(&mut self, result: StepResult) {
        self.results.retain(|r| r.identifier != result.identifier);
        self.results.push(result);
    }

    pub fn get(&self, identifier: &str) -> Option<&StepResult> {
        self.results.iter().find(|r| r.identifier == identifier)
    }

    pub fn answer(&self, identifier: &str) -> Option<&StepAnswer> {
        self.get(identifier).and_then(|r| r.answer.as_ref())
    }

    pub fn remove(&mut self, identifier: &str) -> Option<StepResult> {
        let index = self.results.iter().position(|r| r.identifier == identifier)?;
        Some(self.results.remove(index))
    }
}
