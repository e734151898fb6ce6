use std::fmt;

use easipro_core::fhir_urls;
use easipro_core::models::response::QuestionnaireResponse;
use serde::{Deserialize, Serialize};

/// T-score mean.
const T_MEAN: f64 = 50.0;
/// T-score standard deviation.
const T_SD: f64 = 10.0;

/// Final IRT estimate reported by the CAT engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub theta: f64,
    pub standard_error: f64,
}

impl ScoreReport {
    /// Read theta and standard error from the `questionnaire-scores`
    /// extension. `None` if either is missing or not numeric.
    pub fn from_response(response: &QuestionnaireResponse) -> Option<Self> {
        let scores = response.extension(fhir_urls::QUESTIONNAIRE_SCORES)?;
        let theta = scores.sub_extension(fhir_urls::SCORE_THETA)?.value_decimal()?;
        let standard_error = scores
            .sub_extension(fhir_urls::SCORE_STANDARD_ERROR)?
            .value_decimal()?;
        Some(Self {
            theta,
            standard_error,
        })
    }

    /// `theta * 10 + 50`, rounded to the nearest integer.
    pub fn t_score(&self) -> f64 {
        (self.theta * T_SD + T_MEAN).round()
    }

    /// Standard error on the T-score scale, rounded.
    pub fn scaled_standard_error(&self) -> f64 {
        (self.standard_error * T_SD).round()
    }
}

impl fmt::Display for ScoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T-Score: {:.1}\nStdErr: {:.1}",
            self.t_score(),
            self.scaled_standard_error()
        )
    }
}
