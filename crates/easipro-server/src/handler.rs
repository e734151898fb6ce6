//! The request-handler seam between the domain model and the wire.
//!
//! Domain code builds a [`FhirRequest`] and hands it to a
//! [`RequestHandler`]; [`AdaptiveServer`](crate::client::AdaptiveServer) is
//! the HTTP implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use easipro_core::resource::{self, FhirResource, resource_type_of};
use serde_json::Value;

use crate::error::ServerError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// How strictly a response body is checked before decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// Tolerate a missing `resourceType`; unknown members are kept.
    #[default]
    Lenient,
    /// Require `resourceType` to be present and match.
    Strict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FhirRequest {
    pub method: Method,
    /// Path relative to the server base, or an absolute URL.
    pub target: String,
    pub body: Option<Value>,
    pub parse_mode: ParseMode,
}

impl FhirRequest {
    pub fn get(target: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            target: target.into(),
            body: None,
            parse_mode: ParseMode::default(),
        }
    }

    pub fn post(target: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            target: target.into(),
            body: Some(body),
            parse_mode: ParseMode::default(),
        }
    }

    pub fn with_parse_mode(mut self, parse_mode: ParseMode) -> Self {
        self.parse_mode = parse_mode;
        self
    }
}

/// Performs one FHIR interaction and returns the raw response resource.
///
/// Implementations report non-success statuses and `OperationOutcome`
/// bodies as errors. No retries.
pub trait RequestHandler: Send + Sync {
    fn perform(&self, request: FhirRequest) -> BoxFuture<'_, Result<Value, ServerError>>;
}

impl<T: RequestHandler + ?Sized> RequestHandler for Arc<T> {
    fn perform(&self, request: FhirRequest) -> BoxFuture<'_, Result<Value, ServerError>> {
        (**self).perform(request)
    }
}

/// Decode a response resource according to `mode`.
pub fn decode<T: FhirResource>(value: Value, mode: ParseMode) -> Result<T, ServerError> {
    if mode == ParseMode::Strict && resource_type_of(&value).is_none() {
        return Err(ServerError::ResponseParse(format!(
            "response has no resourceType (expected {})",
            T::RESOURCE_TYPE
        )));
    }
    Ok(resource::decode(value)?)
}

/// Perform `request` and decode the reply as `T`.
pub async fn fetch<T: FhirResource>(
    handler: &dyn RequestHandler,
    request: FhirRequest,
) -> Result<T, ServerError> {
    let mode = request.parse_mode;
    let value = handler.perform(request).await?;
    decode(value, mode)
}

/// Parse a response body, turning an `OperationOutcome` into an error.
pub fn parse_body(body: &str) -> Result<Value, ServerError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ServerError::ResponseParse(format!("invalid JSON: {e}")))?;

    if resource_type_of(&value) == Some("OperationOutcome") {
        return Err(ServerError::OperationOutcome(outcome_diagnostics(&value)));
    }
    Ok(value)
}

/// Join the diagnostics (or details text) of every issue in an outcome.
pub fn outcome_diagnostics(outcome: &Value) -> String {
    let messages: Vec<&str> = outcome
        .get("issue")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|issue| {
            issue
                .get("diagnostics")
                .and_then(Value::as_str)
                .or_else(|| {
                    issue
                        .get("details")
                        .and_then(|d| d.get("text"))
                        .and_then(Value::as_str)
                })
        })
        .collect();

    if messages.is_empty() {
        "unspecified error".to_string()
    } else {
        messages.join("; ")
    }
}
