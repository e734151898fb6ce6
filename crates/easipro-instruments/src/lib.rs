//! easipro-instruments
//!
//! Questionnaire instruments and the tasks that run them. An adaptive
//! instrument asks the CAT engine for each next item; a static one walks the
//! Questionnaire's own items.

pub mod adaptive;
pub mod error;
pub mod extract;
pub mod questionnaire;
pub mod scoring;
pub mod session;
pub mod steps;
pub mod task;

use std::sync::Arc;
use std::time::Duration;

use easipro_core::fhir_urls;
use easipro_core::models::bundle::Bundle;
use easipro_core::models::datatypes::Coding;
use easipro_core::models::questionnaire::Questionnaire;
use easipro_core::models::step::TaskResult;
use easipro_server::handler::RequestHandler;

use adaptive::AdaptiveQuestionnaire;
use error::InstrumentError;
use questionnaire::StaticQuestionnaire;
use task::NavigableTask;

/// Default bound on one next-q round trip.
pub const DEFAULT_ROUND_TRIP_TIMEOUT: Duration = Duration::from_secs(30);

/// What a task needs from its surroundings to talk to the server.
#[derive(Clone)]
pub struct SessionContext {
    pub server: Arc<dyn RequestHandler>,
    pub round_trip_timeout: Duration,
}

impl SessionContext {
    pub fn new(server: Arc<dyn RequestHandler>) -> Self {
        Self {
            server,
            round_trip_timeout: DEFAULT_ROUND_TRIP_TIMEOUT,
        }
    }

    pub fn with_round_trip_timeout(mut self, timeout: Duration) -> Self {
        self.round_trip_timeout = timeout;
        self
    }
}

/// Trait implemented by each questionnaire instrument.
pub trait Instrument: Send + Sync {
    /// Stable identifier (the Questionnaire id, or its canonical url).
    fn identifier(&self) -> &str;

    fn title(&self) -> Option<&str>;

    /// Primary code of the Questionnaire, if it declares one.
    fn code(&self) -> Option<&Coding>;

    /// Create a fresh task for one participant session.
    fn generate_task(
        &self,
        context: &SessionContext,
    ) -> Result<Box<dyn NavigableTask>, InstrumentError>;

    /// Package the task's final response as a collection Bundle, or `None`
    /// when the task has nothing to submit yet.
    fn generate_response_bundle(
        &self,
        task: &dyn NavigableTask,
        results: &TaskResult,
    ) -> Result<Option<Bundle>, InstrumentError> {
        match task.final_response(results)? {
            Some(response) => Ok(Some(Bundle::collection(&[response])?)),
            None => Ok(None),
        }
    }
}

/// Whether a Questionnaire should be driven by the adaptive server.
///
/// A Questionnaire flagged with the SDC adaptive extension, or one that ships
/// without items, is adaptive.
pub fn is_adaptive(questionnaire: &Questionnaire) -> bool {
    let flagged = questionnaire
        .extension(fhir_urls::SDC_ADAPTIVE)
        .is_some_and(|ext| {
            !matches!(ext.raw_value(), Some((_, serde_json::Value::Bool(false))))
        });
    flagged || questionnaire.item.is_empty()
}

/// Pick the instrument that runs `questionnaire`.
pub fn instrument_for(
    questionnaire: Questionnaire,
) -> Result<Box<dyn Instrument>, InstrumentError> {
    if is_adaptive(&questionnaire) {
        Ok(Box::new(AdaptiveQuestionnaire::new(questionnaire)?))
    } else {
        Ok(Box::new(StaticQuestionnaire::new(questionnaire)?))
    }
}

/// Identifier for a Questionnaire: its id, else its canonical url.
pub(crate) fn questionnaire_identifier(
    questionnaire: &Questionnaire,
) -> Result<String, InstrumentError> {
    questionnaire
        .id
        .clone()
        .or_else(|| questionnaire.url.clone())
        .ok_or(InstrumentError::MissingQuestionnaireUrl)
}
