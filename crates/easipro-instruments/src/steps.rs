//! Building presentable steps from Questionnaire items.

use easipro_core::models::questionnaire::{ItemType, Questionnaire, QuestionnaireItem};
use easipro_core::models::step::{ChoiceOption, Step};

use crate::error::InstrumentError;

pub const INTRODUCTION_STEP: &str = "introduction";
pub const CONCLUSION_STEP: &str = "conclusion";

/// Build the question step for `item`, resolving choice options against
/// `questionnaire` (inline options or a contained ValueSet).
pub fn question_step(
    questionnaire: &Questionnaire,
    item: &QuestionnaireItem,
) -> Result<Step, InstrumentError> {
    let link_id = item.link_id.as_deref().ok_or(InstrumentError::MissingLinkId)?;
    let item_type = item
        .item_type
        .ok_or_else(|| InstrumentError::MissingItemType {
            link_id: link_id.to_string(),
        })?;

    let choices = match item_type {
        ItemType::Choice => questionnaire.answer_choices(item)?,
        // Free text is accepted, so an open choice may list nothing.
        ItemType::OpenChoice => questionnaire.answer_choices(item).unwrap_or_default(),
        _ => Vec::new(),
    };

    Ok(Step::question(
        item.clone(),
        choices.iter().map(ChoiceOption::from).collect(),
    )?)
}

const INTRODUCTION_TEXT: &str =
    "Answer each question as it appears. Your answers decide which question comes next.";

pub fn introduction_step(questionnaire: &Questionnaire) -> Step {
    Step::instruction(
        INTRODUCTION_STEP,
        questionnaire.title.clone(),
        Some(INTRODUCTION_TEXT.to_string()),
    )
}
