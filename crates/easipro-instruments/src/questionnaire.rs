//! Static questionnaires: every item is in the Questionnaire up front.
//!
//! Groups are flattened into their children, display items become
//! instruction steps, and `enableWhen` decides which steps are shown.

use std::cmp::Ordering;
use std::collections::HashMap;

use easipro_core::fhir_urls;
use easipro_core::models::datatypes::Coding;
use easipro_core::models::questionnaire::{
    EnableBehavior, EnableWhen, ItemType, Questionnaire, QuestionnaireItem,
};
use easipro_core::models::response::{AnswerValue, QuestionnaireResponse, ResponseStatus};
use easipro_core::models::step::{Step, TaskResult};
use easipro_server::handler::BoxFuture;
use jiff::Timestamp;
use tracing::{debug, info};

use crate::error::InstrumentError;
use crate::extract::extract_response_item;
use crate::steps::{CONCLUSION_STEP, question_step};
use crate::task::{NavigableTask, Navigation};
use crate::{Instrument, SessionContext, questionnaire_identifier};

#[derive(Debug, Clone)]
pub struct StaticQuestionnaire {
    questionnaire: Questionnaire,
    identifier: String,
}

impl StaticQuestionnaire {
    pub fn new(questionnaire: Questionnaire) -> Result<Self, InstrumentError> {
        let identifier = questionnaire_identifier(&questionnaire)?;
        Ok(Self {
            questionnaire,
            identifier,
        })
    }
}

impl Instrument for StaticQuestionnaire {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn title(&self) -> Option<&str> {
        self.questionnaire.title.as_deref()
    }

    fn code(&self) -> Option<&Coding> {
        self.questionnaire.code.first()
    }

    fn generate_task(
        &self,
        _context: &SessionContext,
    ) -> Result<Box<dyn NavigableTask>, InstrumentError> {
        Ok(Box::new(QuestionnaireTask::new(
            self.questionnaire.clone(),
            self.identifier.clone(),
        )?))
    }
}

pub struct QuestionnaireTask {
    questionnaire: Questionnaire,
    identifier: String,
    steps: Vec<Step>,
    /// linkId -> linkIds of every enclosing item, outermost first.
    ancestors: HashMap<String, Vec<String>>,
    /// Results as of the last forward navigation, for stepping back.
    seen: TaskResult,
    completed: bool,
}

impl QuestionnaireTask {
    pub fn new(questionnaire: Questionnaire, identifier: String) -> Result<Self, InstrumentError> {
        let mut steps = Vec::new();
        let mut ancestors = HashMap::new();
        flatten(
            &questionnaire,
            &questionnaire.item,
            &[],
            &mut steps,
            &mut ancestors,
        )?;
        steps.push(Step::completion(
            CONCLUSION_STEP,
            questionnaire.title.clone(),
            Some("Thank you. The questionnaire is complete.".to_string()),
        ));
        debug!(identifier = %identifier, steps = steps.len(), "built questionnaire task");

        Ok(Self {
            questionnaire,
            identifier,
            steps,
            ancestors,
            seen: TaskResult::default(),
            completed: false,
        })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    fn position(&self, identifier: &str) -> Result<usize, InstrumentError> {
        self.steps
            .iter()
            .position(|s| s.identifier == identifier)
            .ok_or_else(|| InstrumentError::UnknownStep(identifier.to_string()))
    }

    fn is_shown(&self, step: &Step, results: &TaskResult) -> bool {
        self.is_item_enabled(&step.identifier, results)
    }

    /// An item is enabled only when it and every enclosing item are.
    fn is_item_enabled(&self, link_id: &str, results: &TaskResult) -> bool {
        let own = std::iter::once(link_id);
        let enclosing = self
            .ancestors
            .get(link_id)
            .into_iter()
            .flatten()
            .map(String::as_str);
        enclosing.chain(own).all(|id| {
            self.questionnaire
                .item_by_link_id(id)
                .is_none_or(|item| is_enabled(&self.questionnaire, item, results))
        })
    }

    fn advance(
        &mut self,
        current: Option<&str>,
        results: &TaskResult,
    ) -> Result<Navigation, InstrumentError> {
        self.seen = results.clone();
        let start = match current {
            None => 0,
            Some(identifier) => {
                let index = self.position(identifier)?;
                let step = &self.steps[index];
                if step.is_completion() {
                    return Ok(Navigation::Finish);
                }
                if let Some(item) = step.item()
                    && item.is_required()
                    && !has_answer(item, results)?
                {
                    debug!(identifier, "required question unanswered");
                    return Ok(Navigation::Stay);
                }
                index + 1
            }
        };

        let next = self.steps[start..]
            .iter()
            .find(|s| self.is_shown(s, results))
            .cloned();
        match next {
            Some(step) => {
                if step.is_completion() {
                    self.completed = true;
                    info!(identifier = %self.identifier, "questionnaire completed");
                }
                Ok(Navigation::Step(step))
            }
            None => Ok(Navigation::Finish),
        }
    }

    fn back(&mut self, current: &str) -> Option<Step> {
        let index = self.position(current).ok()?;
        let previous = self.steps[..index]
            .iter()
            .rev()
            .find(|s| self.is_shown(s, &self.seen))
            .cloned()?;
        self.completed = false;
        Some(previous)
    }
}

impl NavigableTask for QuestionnaireTask {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn step_after<'a>(
        &'a mut self,
        current: Option<&'a str>,
        results: &'a TaskResult,
    ) -> BoxFuture<'a, Result<Navigation, InstrumentError>> {
        let navigation = self.advance(current, results);
        Box::pin(async move { navigation })
    }

    fn step_before(&mut self, current: &str) -> Option<Step> {
        self.back(current)
    }

    fn step(&self, identifier: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.identifier == identifier)
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn final_response(
        &self,
        results: &TaskResult,
    ) -> Result<Option<QuestionnaireResponse>, InstrumentError> {
        if !self.completed {
            return Ok(None);
        }

        let mut response = QuestionnaireResponse {
            id: Some(uuid::Uuid::new_v4().to_string()),
            status: ResponseStatus::Completed,
            authored: Some(Timestamp::now().to_string()),
            questionnaire: self
                .questionnaire
                .url
                .clone()
                .or_else(|| self.questionnaire.id.as_deref().map(fhir_urls::questionnaire)),
            ..Default::default()
        };

        for step in &self.steps {
            let Some(item) = step.item() else { continue };
            if !self.is_item_enabled(&step.identifier, results) {
                continue;
            }
            if let Some(result) = results.get(&step.identifier)
                && let Some(answered) = extract_response_item(item, result)?
            {
                response.push_item(answered)?;
            }
        }
        Ok(Some(response))
    }
}

/// Depth-first: groups contribute their children, display items become
/// instructions, everything else becomes a question.
fn flatten(
    questionnaire: &Questionnaire,
    items: &[QuestionnaireItem],
    parents: &[String],
    steps: &mut Vec<Step>,
    ancestors: &mut HashMap<String, Vec<String>>,
) -> Result<(), InstrumentError> {
    for item in items {
        let link_id = item.link_id.as_deref().ok_or(InstrumentError::MissingLinkId)?;
        ancestors.insert(link_id.to_string(), parents.to_vec());
        let mut lineage = parents.to_vec();
        lineage.push(link_id.to_string());
        match item.item_type {
            Some(ItemType::Group) => {
                if item.text.is_some() {
                    steps.push(Step::instruction(link_id, item.text.clone(), None));
                }
                flatten(questionnaire, &item.item, &lineage, steps, ancestors)?;
            }
            Some(ItemType::Display) => {
                steps.push(Step::instruction(link_id, None, item.text.clone()));
            }
            _ => {
                steps.push(question_step(questionnaire, item)?);
                flatten(questionnaire, &item.item, &lineage, steps, ancestors)?;
            }
        }
    }
    Ok(())
}

fn has_answer(item: &QuestionnaireItem, results: &TaskResult) -> Result<bool, InstrumentError> {
    let Some(link_id) = item.link_id.as_deref() else {
        return Ok(false);
    };
    match results.get(link_id) {
        Some(result) => Ok(extract_response_item(item, result)?.is_some()),
        None => Ok(false),
    }
}

/// Evaluate `item.enableWhen` against the captured results.
///
/// With several conditions and no `enableBehavior`, any match enables.
pub fn is_enabled(
    questionnaire: &Questionnaire,
    item: &QuestionnaireItem,
    results: &TaskResult,
) -> bool {
    if item.enable_when.is_empty() {
        return true;
    }
    let mut outcomes = item
        .enable_when
        .iter()
        .map(|condition| condition_holds(questionnaire, condition, results));
    match item.enable_behavior {
        Some(EnableBehavior::All) => outcomes.all(|held| held),
        Some(EnableBehavior::Any) | None => outcomes.any(|held| held),
    }
}

fn condition_holds(
    questionnaire: &Questionnaire,
    condition: &EnableWhen,
    results: &TaskResult,
) -> bool {
    let actual: Vec<AnswerValue> = questionnaire
        .item_by_link_id(&condition.question)
        .and_then(|question| {
            let result = results.get(&condition.question)?;
            extract_response_item(question, result).ok().flatten()
        })
        .map(|answered| answered.answer_values())
        .unwrap_or_default();

    let operator = condition.effective_operator();
    if operator == "exists" {
        return !actual.is_empty() == condition.expects_answer();
    }

    let Some(expected) = condition.answer() else {
        return false;
    };
    match operator {
        "=" => actual.iter().any(|a| answers_equal(a, &expected)),
        "!=" => !actual.iter().any(|a| answers_equal(a, &expected)),
        ">" => any_ordered(&actual, &expected, |o| o == Ordering::Greater),
        "<" => any_ordered(&actual, &expected, |o| o == Ordering::Less),
        ">=" => any_ordered(&actual, &expected, |o| o != Ordering::Less),
        "<=" => any_ordered(&actual, &expected, |o| o != Ordering::Greater),
        other => {
            debug!(operator = other, "unsupported enableWhen operator");
            false
        }
    }
}

fn answers_equal(actual: &AnswerValue, expected: &AnswerValue) -> bool {
    match (actual, expected) {
        (AnswerValue::Coding(a), AnswerValue::Coding(b)) => {
            a.code == b.code
                && (a.system.is_none() || b.system.is_none() || a.system == b.system)
        }
        _ => compare(actual, expected) == Some(Ordering::Equal) || actual == expected,
    }
}

fn any_ordered(
    actual: &[AnswerValue],
    expected: &AnswerValue,
    accept: impl Fn(Ordering) -> bool,
) -> bool {
    actual
        .iter()
        .filter_map(|a| compare(a, expected))
        .any(accept)
}

fn compare(actual: &AnswerValue, expected: &AnswerValue) -> Option<Ordering> {
    match (actual, expected) {
        (AnswerValue::Integer(a), AnswerValue::Integer(b)) => Some(a.cmp(b)),
        (AnswerValue::Integer(a), AnswerValue::Decimal(b)) => (*a as f64).partial_cmp(b),
        (AnswerValue::Decimal(a), AnswerValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (AnswerValue::Decimal(a), AnswerValue::Decimal(b)) => a.partial_cmp(b),
        (AnswerValue::Date(a), AnswerValue::Date(b))
        | (AnswerValue::DateTime(a), AnswerValue::DateTime(b))
        | (AnswerValue::Time(a), AnswerValue::Time(b))
        | (AnswerValue::String(a), AnswerValue::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
