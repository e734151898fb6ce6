//! The adaptive session state machine.
//!
//! A session moves `Introduction -> Question(linkId)* -> Conclusion`. Every
//! successful `next-q` exchange is appended to the history; the last entry is
//! the response the next answer builds on. Stepping back pops the last
//! exchange into a one-shot slot so that re-answering the same way restores it
//! without contacting the server.

use std::collections::HashMap;

use easipro_core::models::response::{QuestionnaireResponse, ResponseItem};
use easipro_core::models::step::{Step, TaskResult};
use easipro_server::handler::BoxFuture;
use tracing::{debug, info, warn};

use crate::SessionContext;
use crate::adaptive::{AdaptiveQuestionnaire, NextQ};
use crate::error::InstrumentError;
use crate::extract::extract_response_item;
use crate::scoring::ScoreReport;
use crate::steps::{CONCLUSION_STEP, INTRODUCTION_STEP, introduction_step, question_step};
use crate::task::{NavigableTask, Navigation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Introduction,
    Question(String),
    Conclusion,
}

/// One exchange: what was submitted and what came back.
#[derive(Debug, Clone)]
struct Exchange {
    answer: Option<ResponseItem>,
    response: QuestionnaireResponse,
}

/// An exchange undone by stepping back, keyed by the step it was sent from.
#[derive(Debug, Clone)]
struct Rewound {
    from_step: String,
    exchange: Exchange,
}

pub struct AdaptiveQuestionnaireTask {
    instrument: AdaptiveQuestionnaire,
    context: SessionContext,
    state: SessionState,
    history: Vec<Exchange>,
    rewound: Option<Rewound>,
    steps: HashMap<String, Step>,
    completed: bool,
}

impl AdaptiveQuestionnaireTask {
    pub fn new(instrument: AdaptiveQuestionnaire, context: SessionContext) -> Self {
        let introduction = introduction_step(instrument.questionnaire());
        let mut steps = HashMap::new();
        steps.insert(INTRODUCTION_STEP.to_string(), introduction);

        Self {
            instrument,
            context,
            state: SessionState::Introduction,
            history: Vec::new(),
            rewound: None,
            steps,
            completed: false,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Server replies in exchange order.
    pub fn history(&self) -> impl Iterator<Item = &QuestionnaireResponse> {
        self.history.iter().map(|e| &e.response)
    }

    pub fn latest_response(&self) -> Option<&QuestionnaireResponse> {
        self.history.last().map(|e| &e.response)
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.state_step_id())
    }

    /// Final score, once the server reported one.
    pub fn score(&self) -> Option<ScoreReport> {
        self.latest_response().and_then(ScoreReport::from_response)
    }

    fn state_step_id(&self) -> &str {
        match &self.state {
            SessionState::Introduction => INTRODUCTION_STEP,
            SessionState::Question(link_id) => link_id,
            SessionState::Conclusion => CONCLUSION_STEP,
        }
    }

    async fn advance(
        &mut self,
        current: Option<&str>,
        results: &TaskResult,
    ) -> Result<Navigation, InstrumentError> {
        let Some(current) = current else {
            return self.replay();
        };
        if current != self.state_step_id() {
            debug!(current, expected = self.state_step_id(), "stale step replayed");
            return self.replay();
        }

        match self.state.clone() {
            SessionState::Introduction => self.submit(INTRODUCTION_STEP, None).await,
            SessionState::Question(link_id) => {
                let item = self
                    .steps
                    .get(&link_id)
                    .and_then(Step::item)
                    .ok_or_else(|| InstrumentError::UnknownStep(link_id.clone()))?;
                let answer = match results.get(&link_id) {
                    Some(result) => extract_response_item(item, result)?,
                    None => None,
                };
                let Some(answer) = answer else {
                    debug!(link_id = %link_id, "no answer captured");
                    return Ok(Navigation::Stay);
                };
                self.submit(&link_id, Some(answer)).await
            }
            SessionState::Conclusion => Ok(Navigation::Finish),
        }
    }

    /// The step for the current state, without any exchange.
    fn replay(&self) -> Result<Navigation, InstrumentError> {
        self.current_step()
            .cloned()
            .map(Navigation::Step)
            .ok_or_else(|| InstrumentError::UnknownStep(self.state_step_id().to_string()))
    }

    async fn submit(
        &mut self,
        from_step: &str,
        answer: Option<ResponseItem>,
    ) -> Result<Navigation, InstrumentError> {
        let rewound = self.rewound.take();
        if let Some(rewound) = rewound {
            if rewound.from_step == from_step && rewound.exchange.answer == answer {
                info!(from_step, "answer unchanged; restoring undone exchange");
                let (state, step) = self.plan(&rewound.exchange.response)?;
                self.commit(rewound.exchange, state, step.clone());
                return Ok(Navigation::Step(step));
            }
            debug!(from_step, "answer changed; discarding undone exchange");
        }

        let timeout = self.context.round_trip_timeout;
        let prior = self.history.last().map(|e| &e.response);
        let exchange =
            self.instrument
                .next_q(self.context.server.as_ref(), answer.clone(), prior);
        let next: NextQ = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(from_step, ?timeout, "next-q round trip timed out");
                return Err(InstrumentError::Timeout(timeout));
            }
        };

        let (state, step) = self.plan(&next.response)?;
        self.commit(
            Exchange {
                answer,
                response: next.response,
            },
            state,
            step.clone(),
        );
        Ok(Navigation::Step(step))
    }

    /// Work out the state and step a reply leads to.
    fn plan(
        &self,
        response: &QuestionnaireResponse,
    ) -> Result<(SessionState, Step), InstrumentError> {
        if response.is_completed() {
            let text = match ScoreReport::from_response(response) {
                Some(report) => report.to_string(),
                None => "Thank you. The questionnaire is complete.".to_string(),
            };
            let title = self.instrument.questionnaire().title.clone();
            return Ok((
                SessionState::Conclusion,
                Step::completion(CONCLUSION_STEP, title, Some(text)),
            ));
        }

        let snapshot = response
            .contained_questionnaire()
            .ok_or(InstrumentError::MissingNextItem)?;
        let item = snapshot.first_item().ok_or(InstrumentError::MissingNextItem)?;
        let step = question_step(snapshot, item)?;
        Ok((SessionState::Question(step.identifier.clone()), step))
    }

    fn commit(&mut self, exchange: Exchange, state: SessionState, step: Step) {
        if state == SessionState::Conclusion {
            self.completed = true;
            info!(
                exchanges = self.history.len() + 1,
                "adaptive session completed"
            );
        }
        self.history.push(exchange);
        self.steps.insert(step.identifier.clone(), step);
        self.state = state;
    }

    fn step_back(&mut self, current: &str) -> Option<Step> {
        let SessionState::Question(link_id) = &self.state else {
            return None;
        };
        if link_id != current {
            return None;
        }

        let exchange = self.history.pop()?;
        let previous = match self.history.last() {
            Some(prior) => self.plan(&prior.response),
            None => Ok((
                SessionState::Introduction,
                introduction_step(self.instrument.questionnaire()),
            )),
        };
        let (state, step) = match previous {
            Ok(planned) => planned,
            Err(e) => {
                warn!(error = %e, "cannot step back");
                self.history.push(exchange);
                return None;
            }
        };

        debug!(from = current, to = %step.identifier, "stepped back");
        self.rewound = Some(Rewound {
            from_step: step.identifier.clone(),
            exchange,
        });
        self.state = state;
        Some(step)
    }
}

impl NavigableTask for AdaptiveQuestionnaireTask {
    fn identifier(&self) -> &str {
        crate::Instrument::identifier(&self.instrument)
    }

    fn step_after<'a>(
        &'a mut self,
        current: Option<&'a str>,
        results: &'a TaskResult,
    ) -> BoxFuture<'a, Result<Navigation, InstrumentError>> {
        Box::pin(self.advance(current, results))
    }

    fn step_before(&mut self, current: &str) -> Option<Step> {
        self.step_back(current)
    }

    fn step(&self, identifier: &str) -> Option<&Step> {
        self.steps.get(identifier)
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    /// The server's completed response; `None` until the session finishes.
    fn final_response(
        &self,
        _results: &TaskResult,
    ) -> Result<Option<QuestionnaireResponse>, InstrumentError> {
        if !self.completed {
            return Ok(None);
        }
        Ok(self.latest_response().cloned())
    }
}
