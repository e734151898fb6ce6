//! Questionnaire discovery on the adaptive server.

use easipro_core::fhir_urls;
use easipro_core::models::bundle::Bundle;
use easipro_core::models::questionnaire::Questionnaire;
use tracing::{debug, info};

use crate::error::ServerError;
use crate::handler::{FhirRequest, ParseMode, RequestHandler, fetch};

/// Search the server for Questionnaires (`_summary=true`).
///
/// Bundle entries that are not Questionnaires are skipped.
pub async fn discover(handler: &dyn RequestHandler) -> Result<Vec<Questionnaire>, ServerError> {
    let request = FhirRequest::get(fhir_urls::QUESTIONNAIRE_SUMMARY_SEARCH)
        .with_parse_mode(ParseMode::Lenient);
    let bundle: Bundle = fetch(handler, request).await?;

    let questionnaires: Vec<Questionnaire> = bundle.resources()?;
    let skipped = bundle.entry.len() - questionnaires.len();
    if skipped > 0 {
        debug!(skipped, "skipped non-Questionnaire bundle entries");
    }

    info!(count = questionnaires.len(), "discovered questionnaires");
    Ok(questionnaires)
}

/// Read one Questionnaire by logical id.
pub async fn fetch_questionnaire(
    handler: &dyn RequestHandler,
    id: &str,
) -> Result<Questionnaire, ServerError> {
    let request =
        FhirRequest::get(fhir_urls::questionnaire(id)).with_parse_mode(ParseMode::Lenient);
    let questionnaire: Questionnaire = fetch(handler, request).await?;

    info!(id, title = questionnaire.title.as_deref().unwrap_or_default(), "fetched questionnaire");
    Ok(questionnaire)
}
