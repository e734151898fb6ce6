//! easipro-server
//!
//! Transport to the adaptive (CAT) FHIR server: Basic-auth request
//! construction, lenient response decoding, and questionnaire discovery.

pub mod client;
pub mod discovery;
pub mod error;
pub mod handler;
