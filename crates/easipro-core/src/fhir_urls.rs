//! Canonical URL and path conventions.
//!
//! Pure string functions. Extension URLs follow what the CAT engines emit;
//! paths are relative to the FHIR base of the adaptive server.

pub const FHIR_JSON: &str = "application/fhir+json";

pub const EXPIRATION_TIME: &str = "http://hl7.org/fhir/StructureDefinition/expirationTime";

pub const FINISHED_TIME: &str = "http://hl7.org/fhir/StructureDefinition/finishedTime";

pub const QUESTIONNAIRE_SCORES: &str =
    "http://hl7.org/fhir/StructureDefinition/questionnaire-scores";

pub const SCORE_THETA: &str = "http://hl7.org/fhir/StructureDefinition/questionnaire-scores/theta";

pub const SCORE_STANDARD_ERROR: &str =
    "http://hl7.org/fhir/StructureDefinition/questionnaire-scores/standarderror";

pub const SDC_ADAPTIVE: &str =
    "http://hl7.org/fhir/uv/sdc/StructureDefinition/sdc-questionnaire-adaptive";

pub const NEXT_Q: &str = "next-q";

pub const QUESTIONNAIRE_SUMMARY_SEARCH: &str = "Questionnaire?_summary=true";

pub fn questionnaire(id: &str) -> String {
    format!("Questionnaire/{id}")
}

pub fn questionnaire_next_q(id: &str) -> String {
    format!("Questionnaire/{id}/{NEXT_Q}")
}

/// `next-q` endpoint below an absolute questionnaire canonical URL.
pub fn next_q_for_url(url: &str) -> String {
    format!("{}/{NEXT_Q}", url.trim_end_matches('/'))
}

pub fn is_absolute(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

/// Compare extension URLs, tolerating relative sub-extension names.
///
/// Complex extensions are emitted both as `.../questionnaire-scores/theta`
/// and as bare `theta`; both match the canonical form.
pub fn url_matches(candidate: &str, wanted: &str) -> bool {
    if candidate == wanted {
        return true;
    }
    let last = |s: &str| s.rsplit('/').next().map(str::to_string);
    !candidate.is_empty()
        && (!is_absolute(candidate) || !is_absolute(wanted))
        && last(candidate) == last(wanted)
}
