use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use thesis_types::{HttpSpec, Thesis};
use tracing::{debug, warn};

use super::{PerformResult, Performer};
use crate::cancel::CancelScope;
use crate::environment::Environment;
use crate::resolve::{TemplateContext, interpolate_string, interpolate_value};

/// Issues the request of an HTTP thesis and checks the response against its
/// expectations.
///
/// The exchange is stored in the environment as
/// `{ request: {method, url, body}, response: {status, content_type, body} }`
/// so later theses can read it. A missing `allowed_codes` list accepts any
/// 2xx status.
#[derive(Debug, Clone)]
pub struct HttpPerformer {
    client: Client,
    variables: HashMap<String, String>,
}

impl HttpPerformer {
    /// Builds a performer whose requests time out after `timeout`.
    pub fn new(timeout: Duration, variables: HashMap<String, String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, variables))
    }

    pub fn with_client(client: Client, variables: HashMap<String, String>) -> Self {
        Self { client, variables }
    }
}

#[async_trait]
impl Performer for HttpPerformer {
    async fn perform(&self, scope: &CancelScope, environment: &Environment, thesis: &Thesis) -> PerformResult {
        if let Some(cause) = scope.cause() {
            return PerformResult::canceled(cause);
        }
        let Some(spec) = thesis.performable().http() else {
            return PerformResult::crashed(format!("thesis `{}` has no http request", thesis.slug()));
        };

        let view = environment.scenario_view(thesis.slug()).await;
        let context = TemplateContext::new(&view, &self.variables);
        let url = interpolate_string(&spec.request.url, &context);
        let body = spec.request.body.as_ref().map(|body| interpolate_value(body, &context));
        let method = match Method::from_bytes(spec.request.method.as_str().as_bytes()) {
            Ok(method) => method,
            Err(error) => return PerformResult::crashed(error.to_string()),
        };

        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = &body {
            let content_type = spec.request.content_type.as_deref().unwrap_or("application/json");
            let payload = match body {
                Value::String(text) => text.clone().into_bytes(),
                other => match serde_json::to_vec(other) {
                    Ok(payload) => payload,
                    Err(error) => return PerformResult::crashed(error.to_string()),
                },
            };
            request = request.header(CONTENT_TYPE, content_type).body(payload);
        } else if let Some(content_type) = &spec.request.content_type {
            request = request.header(CONTENT_TYPE, content_type.as_str());
        }

        let start = Instant::now();
        debug!(thesis = %thesis.slug(), method = %method, url = %url, "http request started");
        let response = tokio::select! {
            response = request.send() => response,
            cause = scope.cancelled() => return PerformResult::canceled(cause),
        };
        let response = match response {
            Ok(response) => response,
            Err(error) => {
                warn!(thesis = %thesis.slug(), url = %url, error = %error, "http request failed");
                return PerformResult::crashed(format!("request to {url} failed: {error}"));
            }
        };

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(media_type);
        let text = tokio::select! {
            text = response.text() => text,
            cause = scope.cancelled() => return PerformResult::canceled(cause),
        };
        let text = match text {
            Ok(text) => text,
            Err(error) => return PerformResult::crashed(format!("reading response from {url} failed: {error}")),
        };
        let response_body = match decode_body(content_type.as_deref(), &text) {
            Ok(body) => body,
            Err(error) => return PerformResult::crashed(format!("response from {url} is not valid JSON: {error}")),
        };
        debug!(
            thesis = %thesis.slug(),
            status,
            duration_ms = start.elapsed().as_millis(),
            "http request completed"
        );

        environment
            .store(
                thesis.slug(),
                json!({
                    "request": {"method": method.as_str(), "url": url, "body": body},
                    "response": {"status": status, "content_type": content_type, "body": response_body},
                }),
            )
            .await;

        check_response(spec, status, content_type.as_deref())
    }
}

fn media_type(header: &str) -> String {
    header.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

fn decode_body(content_type: Option<&str>, text: &str) -> Result<Value, serde_json::Error> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    let is_json = content_type.is_some_and(|content_type| content_type == "application/json" || content_type.ends_with("+json"));
    if is_json {
        return serde_json::from_str(text);
    }
    Ok(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}

fn check_response(spec: &HttpSpec, status: u16, content_type: Option<&str>) -> PerformResult {
    let expected = &spec.response;
    let status_allowed = if expected.allowed_codes.is_empty() {
        (200..300).contains(&status)
    } else {
        expected.allowed_codes.contains(&status)
    };
    if !status_allowed {
        return PerformResult::failed(format!("unexpected status {status}"));
    }
    if let Some(allowed) = &expected.allowed_content_type
        && content_type != Some(media_type(allowed).as_str())
    {
        return PerformResult::failed(format!(
            "unexpected content type {}, expected {allowed}",
            content_type.unwrap_or("none")
        ));
    }
    PerformResult::passed()
}
