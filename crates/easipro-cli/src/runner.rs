//! Line-oriented terminal runner for any [`NavigableTask`].
//!
//! Each step is printed, one line of input is read per prompt, and the
//! task decides what comes next. `back` steps back; a blank line skips.

use std::io::Write;

use easipro_core::models::questionnaire::ItemType;
use easipro_core::models::step::{ChoiceOption, Step, StepAnswer, StepKind, StepResult, TaskResult};
use easipro_instruments::task::{NavigableTask, Navigation};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

pub const BACK_COMMAND: &str = "back";

/// Run `task` to completion (or end of input) and return what was captured.
///
/// Navigation errors are printed and the participant stays on the step;
/// only a failure to produce the first step ends the run with an error.
pub async fn run_task<R, W>(
    task: &mut dyn NavigableTask,
    input: R,
    output: &mut W,
) -> eyre::Result<TaskResult>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut results = TaskResult::default();

    let first = task.step_after(None, &results).await?;
    let mut current = match first {
        Navigation::Step(step) => step,
        Navigation::Stay | Navigation::Finish => return Ok(results),
    };
    render(&current, output)?;

    loop {
        if current.is_completion() {
            let navigation = task.step_after(Some(&current.identifier), &results).await?;
            match navigation {
                Navigation::Step(next) if next.identifier != current.identifier => {
                    current = next;
                    render(&current, output)?;
                    continue;
                }
                _ => break,
            }
        }

        write!(output, "> ")?;
        output.flush()?;
        let Some(line) = lines.next_line().await? else {
            writeln!(output)?;
            writeln!(output, "Input closed before the questionnaire finished.")?;
            break;
        };
        let line = line.trim();

        if line.eq_ignore_ascii_case(BACK_COMMAND) {
            match task.step_before(&current.identifier) {
                Some(previous) => {
                    current = previous;
                    render(&current, output)?;
                }
                None => writeln!(output, "Already at the first step.")?,
            }
            continue;
        }

        if let StepKind::Question { item, choices } = &current.kind {
            let item_type = item.item_type.unwrap_or(ItemType::Unknown);
            match parse_answer(item_type, choices, line) {
                Ok(answer) => {
                    results.record(StepResult::new(current.identifier.clone(), answer));
                }
                Err(message) => {
                    writeln!(output, "{message}")?;
                    continue;
                }
            }
        }

        let navigation = task.step_after(Some(&current.identifier), &results).await;
        match navigation {
            Ok(Navigation::Step(next)) => {
                current = next;
                render(&current, output)?;
            }
            Ok(Navigation::Stay) => writeln!(output, "Please answer this question to continue.")?,
            Ok(Navigation::Finish) => break,
            Err(e) => {
                warn!(step = %current.identifier, error = %e, "navigation failed");
                writeln!(output, "Could not continue: {e}")?;
                writeln!(output, "Enter your answer again to retry, or type '{BACK_COMMAND}'.")?;
            }
        }
    }

    Ok(results)
}

fn render<W: Write>(step: &Step, output: &mut W) -> std::io::Result<()> {
    writeln!(output)?;
    if let Some(title) = &step.title {
        writeln!(output, "== {title} ==")?;
    }
    if let Some(text) = &step.text {
        writeln!(output, "{text}")?;
    }

    match &step.kind {
        StepKind::Instruction => writeln!(output, "(press Enter to continue)")?,
        StepKind::Question { item, choices } => {
            for (index, choice) in choices.iter().enumerate() {
                writeln!(output, "  {}) {}", index + 1, choice.label)?;
            }
            if let Some(hint) = item.item_type.and_then(input_hint) {
                writeln!(output, "{hint}")?;
            }
        }
        StepKind::Completion => {}
    }
    Ok(())
}

fn input_hint(item_type: ItemType) -> Option<&'static str> {
    match item_type {
        ItemType::Boolean => Some("(yes/no)"),
        ItemType::Date => Some("(YYYY-MM-DD)"),
        ItemType::DateTime => Some("(e.g. 2024-05-01T09:30:00Z)"),
        ItemType::Choice => Some("(enter a number)"),
        ItemType::OpenChoice => Some("(enter a number or your own answer)"),
        _ => None,
    }
}

/// Parse one line of input for a question. A blank line is a skip.
pub fn parse_answer(
    item_type: ItemType,
    choices: &[ChoiceOption],
    line: &str,
) -> Result<Option<StepAnswer>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let answer = match item_type {
        ItemType::Boolean => match line.to_ascii_lowercase().as_str() {
            "y" | "yes" | "true" => StepAnswer::Boolean(true),
            "n" | "no" | "false" => StepAnswer::Boolean(false),
            _ => return Err("Please answer yes or no.".to_string()),
        },
        ItemType::Integer | ItemType::Decimal => line
            .parse::<f64>()
            .map(StepAnswer::Numeric)
            .map_err(|_| format!("'{line}' is not a number."))?,
        ItemType::Date => line
            .parse::<jiff::civil::Date>()
            .map(StepAnswer::Date)
            .map_err(|e| format!("'{line}' is not a date: {e}"))?,
        ItemType::DateTime => match line.parse::<jiff::Timestamp>() {
            Ok(ts) => StepAnswer::DateTime(ts),
            Err(_) => line
                .parse::<jiff::civil::Date>()
                .map(StepAnswer::Date)
                .map_err(|e| format!("'{line}' is not a date or time: {e}"))?,
        },
        ItemType::Choice => StepAnswer::Choice(select(choices, line)?),
        ItemType::OpenChoice => match select(choices, line) {
            Ok(values) => StepAnswer::Choice(values),
            Err(_) => StepAnswer::Text(line.to_string()),
        },
        ItemType::String | ItemType::Text | ItemType::Url | ItemType::Time => {
            StepAnswer::Text(line.to_string())
        }
        other => return Err(format!("{other:?} questions cannot be answered here.")),
    };
    Ok(Some(answer))
}

/// Map `1`, `1,3` or `1 3` onto the encoded choice values.
fn select(choices: &[ChoiceOption], line: &str) -> Result<Vec<String>, String> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|index| choices.get(index))
                .map(|choice| choice.value.clone())
                .ok_or_else(|| format!("Choose a number between 1 and {}.", choices.len()))
        })
        .collect()
}
