//! Turning captured step answers into QuestionnaireResponse items.

use easipro_core::models::questionnaire::{ItemType, QuestionnaireItem};
use easipro_core::models::response::{AnswerValue, ResponseItem};
use easipro_core::models::step::{StepAnswer, StepResult, decode_choice};

use crate::error::InstrumentError;

/// Build the response item for `item` from what was captured on its step.
///
/// `Ok(None)` when nothing usable was captured (skipped step, blank text,
/// empty selection). The item's text and extensions are carried over.
pub fn extract_response_item(
    item: &QuestionnaireItem,
    result: &StepResult,
) -> Result<Option<ResponseItem>, InstrumentError> {
    let link_id = item.link_id.as_deref().ok_or(InstrumentError::MissingLinkId)?;
    let item_type = item
        .item_type
        .ok_or_else(|| InstrumentError::MissingItemType {
            link_id: link_id.to_string(),
        })?;

    let Some(answer) = &result.answer else {
        return Ok(None);
    };

    let values = answer_values(item, link_id, item_type, answer)?;
    if values.is_empty() {
        return Ok(None);
    }

    let mut response_item = ResponseItem::new(link_id);
    response_item.text = item.text.clone();
    response_item.extension = item.extension.clone();
    for value in values {
        response_item = response_item.with_answer(value);
    }
    Ok(Some(response_item))
}

fn answer_values(
    item: &QuestionnaireItem,
    link_id: &str,
    item_type: ItemType,
    answer: &StepAnswer,
) -> Result<Vec<AnswerValue>, InstrumentError> {
    let invalid = |reason: String| InstrumentError::InvalidAnswer {
        link_id: link_id.to_string(),
        reason,
    };

    let values = match (item_type, answer) {
        (ItemType::Boolean, StepAnswer::Boolean(b)) => vec![AnswerValue::Boolean(*b)],
        (ItemType::Integer, StepAnswer::Numeric(n)) => {
            if !n.is_finite() || n.fract() != 0.0 {
                return Err(invalid(format!("{n} is not a whole number")));
            }
            if *n < i64::MIN as f64 || *n >= i64::MAX as f64 {
                return Err(invalid(format!("{n} is out of range for an integer")));
            }
            vec![AnswerValue::Integer(*n as i64)]
        }
        (ItemType::Decimal, StepAnswer::Numeric(n)) => {
            if !n.is_finite() {
                return Err(invalid(format!("{n} is not a finite number")));
            }
            vec![AnswerValue::Decimal(*n)]
        }
        (ItemType::Date, StepAnswer::Date(date)) => vec![AnswerValue::Date(date.to_string())],
        (ItemType::DateTime, StepAnswer::Date(date)) => {
            vec![AnswerValue::DateTime(date.to_string())]
        }
        (ItemType::DateTime, StepAnswer::DateTime(ts)) => {
            vec![AnswerValue::DateTime(ts.to_string())]
        }
        (ItemType::String | ItemType::Text | ItemType::OpenChoice, StepAnswer::Text(text)) => {
            non_blank(text).map(AnswerValue::String).into_iter().collect()
        }
        (ItemType::Url, StepAnswer::Text(text)) => {
            non_blank(text).map(AnswerValue::Uri).into_iter().collect()
        }
        (ItemType::Time, StepAnswer::Text(text)) => {
            non_blank(text).map(AnswerValue::Time).into_iter().collect()
        }
        (ItemType::Choice | ItemType::OpenChoice, StepAnswer::Choice(selected)) => {
            if selected.len() > 1 && !item.allows_multiple() {
                return Err(invalid(format!(
                    "{} selections for a single-choice item",
                    selected.len()
                )));
            }
            selected
                .iter()
                .map(|value| {
                    decode_choice(value)
                        .map(AnswerValue::Coding)
                        .map_err(|e| invalid(e.to_string()))
                })
                .collect::<Result<_, _>>()?
        }
        (item_type, answer) => {
            return Err(invalid(format!(
                "{} answer does not fit a {item_type:?} item",
                answer_kind(answer)
            )));
        }
    };
    Ok(values)
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn answer_kind(answer: &StepAnswer) -> &'static str {
    match answer {
        StepAnswer::Boolean(_) => "boolean",
        StepAnswer::Date(_) => "date",
        StepAnswer::DateTime(_) => "date-time",
        StepAnswer::Numeric(_) => "numeric",
        StepAnswer::Text(_) => "text",
        StepAnswer::Choice(_) => "choice",
    }
}
