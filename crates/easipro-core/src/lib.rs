//! easipro-core
//!
//! Pure domain types: the FHIR resources the adaptive engine exchanges with
//! the scoring server, the step/result vocabulary shared with task runners,
//! and canonical URL conventions. No network dependency.

pub mod error;
pub mod fhir_urls;
pub mod models;
pub mod resource;
