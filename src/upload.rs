//! Upload coordinator: send the raw image to the classifier and report back.
//!
//! The request is a single `multipart/form-data` POST with one part (named
//! `file` by default) holding the raw bytes and original filename. A 2xx
//! answer must be JSON `{ "label": string, "confidence": 0..1 }`.
//!
//! ## Outcome tracking
//!
//! The latest [`UploadOutcome`] is published on a `tokio::sync::watch`
//! channel. It is set to `Pending` when a request starts and always replaced
//! by `Succeeded` or `Failed` when it ends, on every exit path. There is no
//! queueing and no cancellation: the caller keeps the trigger disabled while
//! [`Uploader::is_uploading`] is true.

use crate::config::WidgetConfig;
use crate::error::LensError;
use crate::media::RawImage;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Classifier answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    /// Probability in `[0, 1]`.
    pub confidence: f64,
}

impl Prediction {
    /// Confidence as a percentage with one decimal place, e.g. `87.3`.
    pub fn confidence_percent(&self) -> String {
        format!("{:.1}", self.confidence * 100.0)
    }

    /// `Prediction: {label} ({pct}% confidence)`
    pub fn message(&self) -> String {
        format!(
            "Prediction: {} ({}% confidence)",
            self.label,
            self.confidence_percent()
        )
    }
}

/// Result of the most recent upload attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Pending,
    Succeeded {
        prediction: Prediction,
        message: String,
    },
    Failed {
        message: String,
    },
}

impl UploadOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, UploadOutcome::Pending)
    }
}

/// Posts images to the prediction endpoint.
pub struct Uploader {
    client: reqwest::Client,
    url: String,
    field: String,
    status: watch::Sender<Option<UploadOutcome>>,
}

impl Uploader {
    pub fn new(config: &WidgetConfig) -> Result<Self, LensError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| LensError::InvalidConfig(format!("HTTP client: {e}")))?;

        let (status, _) = watch::channel(None);
        Ok(Self {
            client,
            url: config.predict_url(),
            field: config.upload_field.clone(),
            status,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Watch the outcome of the current/most recent attempt.
    pub fn subscribe(&self) -> watch::Receiver<Option<UploadOutcome>> {
        self.status.subscribe()
    }

    pub fn outcome(&self) -> Option<UploadOutcome> {
        self.status.borrow().clone()
    }

    pub fn is_uploading(&self) -> bool {
        self.status
            .borrow()
            .as_ref()
            .is_some_and(UploadOutcome::is_pending)
    }

    /// Upload `raw` and classify it.
    ///
    /// Fails immediately with [`LensError::NoImageSelected`], without any
    /// network traffic, when there is no image or it is empty.
    pub async fn upload(&self, raw: Option<&RawImage>) -> Result<Prediction, LensError> {
        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            let err = LensError::NoImageSelected;
            self.status.send_replace(Some(UploadOutcome::Failed {
                message: err.user_message(),
            }));
            return Err(err);
        };

        self.status.send_replace(Some(UploadOutcome::Pending));
        let start = Instant::now();

        let result = self.send(raw).await;

        let outcome = match &result {
            Ok(prediction) => {
                let message = prediction.message();
                info!("{} in {}ms", message, start.elapsed().as_millis());
                UploadOutcome::Succeeded {
                    prediction: prediction.clone(),
                    message,
                }
            }
            Err(e) => {
                warn!("Upload error: {}", e);
                UploadOutcome::Failed {
                    message: e.user_message(),
                }
            }
        };
        self.status.send_replace(Some(outcome));
        result
    }

    async fn send(&self, raw: &RawImage) -> Result<Prediction, LensError> {
        debug!(
            "POST {} ({} bytes, {}, field '{}')",
            self.url,
            raw.len(),
            raw.mime,
            self.field
        );

        let form = Form::new().part(self.field.clone(), image_part(raw));
        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| LensError::transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Could not read error body for HTTP {}: {}", status, e);
                    String::new()
                }
            };
            return Err(LensError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| LensError::InvalidResponse(e.to_string()))?;

        if !(0.0..=1.0).contains(&prediction.confidence) {
            warn!(
                "Confidence {} outside [0, 1] for label '{}'",
                prediction.confidence, prediction.label
            );
        }
        Ok(prediction)
    }
}

/// Multipart part carrying the raw bytes, filename and declared type.
fn image_part(raw: &RawImage) -> Part {
    let part = Part::bytes(raw.bytes.clone()).file_name(raw.filename.clone());
    match part.mime_str(&raw.mime) {
        Ok(part) => part,
        Err(_) => {
            warn!("Ignoring unparsable MIME type '{}'", raw.mime);
            Part::bytes(raw.bytes.clone()).file_name(raw.filename.clone())
        }
    }
}
