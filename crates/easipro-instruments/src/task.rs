//! The navigation contract between a task and the runner presenting it.

use easipro_core::models::response::QuestionnaireResponse;
use easipro_core::models::step::{Step, TaskResult};
use easipro_server::handler::BoxFuture;

use crate::error::InstrumentError;

/// Outcome of asking a task what comes after the current step.
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    /// Present this step next.
    Step(Step),
    /// Keep the participant on the current step.
    Stay,
    /// The task is over.
    Finish,
}

pub trait NavigableTask: Send {
    fn identifier(&self) -> &str;

    /// Resolve the step after `current` (`None` at task start).
    ///
    /// Adaptive tasks may contact the server here. On error the task state is
    /// unchanged and the same step may be retried.
    fn step_after<'a>(
        &'a mut self,
        current: Option<&'a str>,
        results: &'a TaskResult,
    ) -> BoxFuture<'a, Result<Navigation, InstrumentError>>;

    /// Step back from `current`. `None` when there is nothing to go back to.
    fn step_before(&mut self, current: &str) -> Option<Step>;

    fn step(&self, identifier: &str) -> Option<&Step>;

    fn is_completed(&self) -> bool;

    /// The response to submit once the task is complete.
    fn final_response(
        &self,
        results: &TaskResult,
    ) -> Result<Option<QuestionnaireResponse>, InstrumentError>;
}
