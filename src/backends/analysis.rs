// SPDX-License-Identifier: MPL-2.0

//! Vision service client
//!
//! The service receives the JPEG bytes of a capture (or the reference, when
//! the image is not local) and answers with labels:
//!
//! ```json
//! { "labels": [ { "name": "Person", "confidence": 97.3 }, ... ] }
//! ```
//!
//! Confidences may be percentages or fractions; both are normalized to
//! `0.0..=1.0`. The scale applies to the whole response: an explicit
//! `"scale": "percent"` or `"scale": "fraction"` wins, otherwise any
//! confidence above 1.0 marks every label as a percentage.

use crate::errors::{GatewayError, GatewayResult};
use crate::pipelines::types::DetectedLabel;
use crate::storage;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

/// Classifies an uploaded image
pub trait AnalysisGateway: Send + Sync {
    /// Labels for the image, highest confidence first
    fn analyze<'a>(&'a self, image_ref: &'a str) -> BoxFuture<'a, GatewayResult<Vec<DetectedLabel>>>;
}

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    #[serde(default)]
    labels: Vec<LabelPayload>,
    #[serde(default)]
    scale: Option<ConfidenceScale>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ConfidenceScale {
    Percent,
    Fraction,
}

#[derive(Debug, Deserialize)]
struct LabelPayload {
    name: String,
    confidence: f32,
}

/// Vision service over HTTP
pub struct HttpAnalysisGateway {
    url: String,
    agent: ureq::Agent,
}

impl HttpAnalysisGateway {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            url: url.into(),
            agent,
        }
    }
}

impl AnalysisGateway for HttpAnalysisGateway {
    fn analyze<'a>(&'a self, image_ref: &'a str) -> BoxFuture<'a, GatewayResult<Vec<DetectedLabel>>> {
        Box::pin(async move {
            let body = match storage::path_from_reference(image_ref) {
                Some(path) => RequestBody::Image(tokio::fs::read(&path).await.map_err(|e| {
                    let msg = format!("{}: {}", path.display(), e);
                    if e.kind() == std::io::ErrorKind::NotFound {
                        GatewayError::Permanent(msg)
                    } else {
                        GatewayError::Transient(msg)
                    }
                })?),
                None => RequestBody::Reference(
                    serde_json::json!({ "image_ref": image_ref }).to_string(),
                ),
            };

            let agent = self.agent.clone();
            let url = self.url.clone();

            // ureq is blocking
            let text = tokio::task::spawn_blocking(move || post(&agent, &url, body))
                .await
                .map_err(|e| GatewayError::Transient(format!("analysis task failed: {}", e)))??;

            trace!(response = %text, "Analysis response");
            let labels = parse_labels(&text)?;
            debug!(image_ref, count = labels.len(), "Image analyzed");
            Ok(labels)
        })
    }
}

/// Placeholder used when no vision service is configured (dry runs)
///
/// Reports no labels, so every capture ends up suppressed.
pub struct NullAnalysisGateway;

impl AnalysisGateway for NullAnalysisGateway {
    fn analyze<'a>(&'a self, image_ref: &'a str) -> BoxFuture<'a, GatewayResult<Vec<DetectedLabel>>> {
        Box::pin(async move {
            debug!(image_ref, "No vision service configured, skipping analysis");
            Ok(Vec::new())
        })
    }
}

enum RequestBody {
    Image(Vec<u8>),
    Reference(String),
}

fn post(agent: &ureq::Agent, url: &str, body: RequestBody) -> GatewayResult<String> {
    let request = agent.post(url);
    let result = match body {
        RequestBody::Image(bytes) => request.set("Content-Type", "image/jpeg").send_bytes(&bytes),
        RequestBody::Reference(json) => {
            request.set("Content-Type", "application/json").send_string(&json)
        }
    };

    let response = result.map_err(classify_http_error)?;
    response
        .into_string()
        .map_err(|e| GatewayError::Transient(format!("failed to read response: {}", e)))
}

/// Map an HTTP failure onto the retry taxonomy
///
/// Timeouts, rate limiting and server errors are worth retrying; any other
/// client error means the request itself is wrong.
pub(crate) fn classify_http_error(err: ureq::Error) -> GatewayError {
    match err {
        ureq::Error::Status(code, _) if is_retryable_status(code) => {
            GatewayError::Transient(format!("HTTP {}", code))
        }
        ureq::Error::Status(code, _) => GatewayError::Permanent(format!("HTTP {}", code)),
        ureq::Error::Transport(transport) => GatewayError::Transient(transport.to_string()),
    }
}

fn is_retryable_status(code: u16) -> bool {
    code == 408 || code == 429 || code >= 500
}

/// Parse and normalize a service response
fn parse_labels(text: &str) -> GatewayResult<Vec<DetectedLabel>> {
    let response: AnalysisResponse = serde_json::from_str(text)
        .map_err(|e| GatewayError::Permanent(format!("malformed analysis response: {}", e)))?;

    let scale = response.scale.unwrap_or_else(|| {
        if response.labels.iter().any(|l| l.confidence > 1.0) {
            ConfidenceScale::Percent
        } else {
            ConfidenceScale::Fraction
        }
    });
    let divisor = match scale {
        ConfidenceScale::Percent => 100.0,
        ConfidenceScale::Fraction => 1.0,
    };

    let mut labels: Vec<DetectedLabel> = response
        .labels
        .into_iter()
        .filter(|l| l.confidence.is_finite() && l.confidence >= 0.0)
        .map(|l| DetectedLabel::new(l.name, (l.confidence / divisor).min(1.0)))
        .collect();

    labels.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    Ok(labels)
}
