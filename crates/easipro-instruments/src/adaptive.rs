//! Adaptive (CAT) questionnaires and the `next-q` exchange.
//!
//! Each exchange POSTs the response so far to the Questionnaire's `next-q`
//! operation. The server replies with the same response, scored, and either a
//! contained Questionnaire snapshot holding the next item or a `completed`
//! status.

use easipro_core::fhir_urls;
use easipro_core::models::datatypes::{Coding, Extension};
use easipro_core::models::questionnaire::{Questionnaire, QuestionnaireItem};
use easipro_core::models::response::{QuestionnaireResponse, ResponseItem, ResponseStatus};
use easipro_core::resource::FhirResource;
use easipro_server::handler::{FhirRequest, ParseMode, RequestHandler, fetch};
use jiff::{SignedDuration, Timestamp};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::InstrumentError;
use crate::session::AdaptiveQuestionnaireTask;
use crate::task::NavigableTask;
use crate::{Instrument, SessionContext, questionnaire_identifier};

/// How long the server should keep an unfinished session.
pub const SESSION_LIFETIME: SignedDuration = SignedDuration::from_hours(24);

/// One server reply.
#[derive(Debug, Clone, PartialEq)]
pub struct NextQ {
    pub response: QuestionnaireResponse,
    /// First item of the contained snapshot; `None` once completed.
    pub next_item: Option<QuestionnaireItem>,
}

impl NextQ {
    pub fn is_completed(&self) -> bool {
        self.response.is_completed()
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveQuestionnaire {
    questionnaire: Questionnaire,
    identifier: String,
    next_q_target: String,
}

impl AdaptiveQuestionnaire {
    pub fn new(questionnaire: Questionnaire) -> Result<Self, InstrumentError> {
        let next_q_target = match (&questionnaire.url, &questionnaire.id) {
            (Some(url), _) if fhir_urls::is_absolute(url) => fhir_urls::next_q_for_url(url),
            (_, Some(id)) => fhir_urls::questionnaire_next_q(id),
            _ => return Err(InstrumentError::MissingQuestionnaireUrl),
        };
        let identifier = questionnaire_identifier(&questionnaire)?;

        Ok(Self {
            questionnaire,
            identifier,
            next_q_target,
        })
    }

    pub fn questionnaire(&self) -> &Questionnaire {
        &self.questionnaire
    }

    /// Where `next-q` is POSTed: absolute, or relative to the server base.
    pub fn next_q_target(&self) -> &str {
        &self.next_q_target
    }

    /// A fresh in-progress response for the first exchange.
    pub fn new_response(&self) -> QuestionnaireResponse {
        let now = Timestamp::now();
        let expires = now.checked_add(SESSION_LIFETIME).unwrap_or(now);

        let mut response = QuestionnaireResponse {
            id: Some(uuid::Uuid::new_v4().to_string()),
            status: ResponseStatus::InProgress,
            authored: Some(now.to_string()),
            questionnaire: self.canonical(),
            extension: vec![
                Extension::new(fhir_urls::EXPIRATION_TIME)
                    .with_value("valueDateTime", Value::String(expires.to_string())),
                Extension::new(fhir_urls::FINISHED_TIME),
            ],
            ..Default::default()
        };
        response.set_contained_questionnaire(self.questionnaire.snapshot());
        response
    }

    /// The request body for the next exchange: `answer` appended to a copy
    /// of `prior` (or to a fresh response). `prior` itself is never touched.
    pub fn stage(
        &self,
        answer: Option<ResponseItem>,
        prior: Option<&QuestionnaireResponse>,
    ) -> Result<QuestionnaireResponse, InstrumentError> {
        let mut staged = match prior {
            Some(prior) => prior.clone(),
            None => self.new_response(),
        };
        if let Some(answer) = answer {
            staged.push_item(answer)?;
        }
        Ok(staged)
    }

    /// Submit `answer` on top of `prior` and return the server's reply.
    pub async fn next_q(
        &self,
        server: &dyn RequestHandler,
        answer: Option<ResponseItem>,
        prior: Option<&QuestionnaireResponse>,
    ) -> Result<NextQ, InstrumentError> {
        let for_item = answer.as_ref().map(|a| a.link_id.clone());
        let staged = self.stage(answer, prior)?;
        debug!(
            questionnaire = %self.identifier,
            for_item = for_item.as_deref().unwrap_or_default(),
            answered = staged.item.len(),
            "posting next-q"
        );

        let request = FhirRequest::post(self.next_q_target.clone(), staged.to_json()?)
            .with_parse_mode(ParseMode::Lenient);
        let mut response: QuestionnaireResponse = fetch(server, request).await?;
        carry_forward_answers(&staged, &mut response)?;

        let next_item = if response.is_completed() {
            None
        } else {
            Some(
                response
                    .next_item()
                    .cloned()
                    .ok_or(InstrumentError::MissingNextItem)?,
            )
        };

        info!(
            questionnaire = %self.identifier,
            status = ?response.status,
            next_item = next_item.as_ref().and_then(|i| i.link_id.as_deref()).unwrap_or_default(),
            "next-q reply"
        );
        Ok(NextQ {
            response,
            next_item,
        })
    }

    fn canonical(&self) -> Option<String> {
        self.questionnaire
            .url
            .clone()
            .or_else(|| self.questionnaire.id.as_deref().map(fhir_urls::questionnaire))
    }
}

/// The reply must keep every answer already sent. An engine that omits
/// `item` altogether gets the staged items copied in; one that returns a
/// partial list is rejected.
fn carry_forward_answers(
    staged: &QuestionnaireResponse,
    reply: &mut QuestionnaireResponse,
) -> Result<(), InstrumentError> {
    if reply.item.is_empty() {
        if !staged.item.is_empty() {
            debug!(answered = staged.item.len(), "reply omitted items; keeping staged answers");
            reply.item = staged.item.clone();
        }
        return Ok(());
    }

    let dropped: Vec<String> = staged
        .item
        .iter()
        .filter(|sent| !reply.item.iter().any(|kept| kept.link_id == sent.link_id))
        .map(|sent| sent.link_id.clone())
        .collect();
    if !dropped.is_empty() {
        return Err(InstrumentError::AnswersDropped { link_ids: dropped });
    }
    Ok(())
}

impl Instrument for AdaptiveQuestionnaire {
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
        context: &SessionContext,
    ) -> Result<Box<dyn NavigableTask>, InstrumentError> {
        Ok(Box::new(AdaptiveQuestionnaireTask::new(
            self.clone(),
            context.clone(),
        )))
    }
}
