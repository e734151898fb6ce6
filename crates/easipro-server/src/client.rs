//! HTTP client for the adaptive FHIR server.
//!
//! Credentials are injected out-of-band as an HTTP Basic `Authorization`
//! header assembled from the client id/secret pair. Every outgoing request
//! goes through [`AdaptiveServer::build_request`], so every request carries
//! the same authentication and content-type headers.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use easipro_core::fhir_urls;
use easipro_core::models::questionnaire::Questionnaire;
use reqwest::Url;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use tracing::{debug, info, warn};

use crate::discovery;
use crate::error::ServerError;
use crate::handler::{BoxFuture, FhirRequest, Method, RequestHandler, parse_body};

/// Default timeout applied to each HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client id/secret pair issued by the CAT engine operator.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"****")
            .finish()
    }
}

/// `Basic base64(client_id:client_secret)`.
pub fn basic_auth_header(credentials: &Credentials) -> String {
    let pair = format!("{}:{}", credentials.client_id, credentials.client_secret);
    format!("Basic {}", STANDARD.encode(pair))
}

#[derive(Debug, Clone)]
pub struct AdaptiveServer {
    base_url: Url,
    client_id: String,
    authorization: HeaderValue,
    http: reqwest::Client,
}

impl AdaptiveServer {
    /// Create a client for the FHIR base at `base_url`.
    pub fn new(
        base_url: &str,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<Self, ServerError> {
        let base_url = parse_base_url(base_url)?;

        let mut authorization = HeaderValue::from_str(&basic_auth_header(credentials))
            .map_err(|e| ServerError::InvalidHeader(e.to_string()))?;
        authorization.set_sensitive(true);

        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| ServerError::Config(format!("failed to create HTTP client: {e}")))?;

        info!(
            base_url = %base_url,
            client_id = %credentials.client_id,
            "adaptive server configured"
        );

        Ok(Self {
            base_url,
            client_id: credentials.client_id.clone(),
            authorization,
            http,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Resolve a request target against the base URL.
    pub fn resolve(&self, target: &str) -> Result<Url, ServerError> {
        let resolved = if fhir_urls::is_absolute(target) {
            Url::parse(target)
        } else {
            self.base_url.join(target.trim_start_matches('/'))
        };
        resolved.map_err(|e| ServerError::InvalidUrl(format!("{target}: {e}")))
    }

    /// Build the HTTP request for a FHIR interaction, with credentials and
    /// FHIR JSON content negotiation attached.
    pub fn build_request(&self, request: &FhirRequest) -> Result<reqwest::Request, ServerError> {
        let url = self.resolve(&request.target)?;
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };

        let mut builder = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, self.authorization.clone())
            .header(CONTENT_TYPE, fhir_urls::FHIR_JSON)
            .header(ACCEPT, fhir_urls::FHIR_JSON);

        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        Ok(builder.build()?)
    }

    /// Summary-only search for Questionnaires.
    pub async fn discover(&self) -> Result<Vec<Questionnaire>, ServerError> {
        discovery::discover(self).await
    }

    pub async fn fetch_questionnaire(&self, id: &str) -> Result<Questionnaire, ServerError> {
        discovery::fetch_questionnaire(self, id).await
    }

    async fn execute(&self, request: FhirRequest) -> Result<serde_json::Value, ServerError> {
        let http_request = self.build_request(&request)?;
        let url = http_request.url().clone();
        debug!(method = ?request.method, url = %url, "sending FHIR request");

        let response = self.http.execute(http_request).await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "FHIR request failed");
            // Servers often explain the failure in an OperationOutcome.
            if let Err(ServerError::OperationOutcome(message)) = parse_body(&body) {
                return Err(ServerError::OperationOutcome(message));
            }
            return Err(ServerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_body(&body)
    }
}

impl RequestHandler for AdaptiveServer {
    fn perform(
        &self,
        request: FhirRequest,
    ) -> BoxFuture<'_, Result<serde_json::Value, ServerError>> {
        Box::pin(self.execute(request))
    }
}

/// Validate an http(s) base URL and make sure it ends with `/` so relative
/// paths join below it.
fn parse_base_url(base_url: &str) -> Result<Url, ServerError> {
    let trimmed = base_url.trim();
    let mut url = Url::parse(trimmed)
        .map_err(|e| ServerError::InvalidUrl(format!("'{trimmed}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ServerError::InvalidUrl(format!(
            "URL must use http or https scheme, got: {}",
            url.scheme()
        )));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
