use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::models::job::DocumentType;
use crate::models::reason::ApplicationFailedReason;

/// Why the extraction engine could not produce fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, transport failure, rate limit or 5xx.
    Transient,
    InvalidData,
    InvalidFormat,
    InvalidFileType,
    QualityCheckFailed,
    InformationMissing,
    /// Anything the engine reported that has no better classification.
    Fatal,
}

impl FailureKind {
    pub fn is_transient(self) -> bool {
        self == FailureKind::Transient
    }

    /// The reason recorded on the job. Transient failures only reach a job
    /// once retries are exhausted and then count as a generic failure.
    pub fn reason(self) -> ApplicationFailedReason {
        match self {
            FailureKind::InvalidData => ApplicationFailedReason::DocumentProcessingFailedInvalidData,
            FailureKind::InvalidFormat => {
                ApplicationFailedReason::DocumentProcessingFailedInvalidFormat
            }
            FailureKind::InvalidFileType => {
                ApplicationFailedReason::DocumentProcessingFailedInvalidFileType
            }
            FailureKind::QualityCheckFailed => ApplicationFailedReason::DocumentQualityCheckFailed,
            FailureKind::InformationMissing => ApplicationFailedReason::InformationMissing,
            FailureKind::Transient | FailureKind::Fatal => {
                ApplicationFailedReason::DocumentProcessingFailed
            }
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("extraction failed ({kind:?}): {detail}")]
pub struct ExtractionFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl ExtractionFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// External field-extraction engine.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Returns the raw field map read from the document.
    async fn extract(
        &self,
        document: &[u8],
        document_type: DocumentType,
    ) -> Result<serde_json::Value, ExtractionFailure>;
}

/// Detects the media type from magic bytes. Only types the engine accepts are recognized.
pub fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF-") {
        Some("application/pdf")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Client for a Cloudflare Workers AI vision model that reads admission documents.
pub struct WorkersAiExtractor {
    http: Client,
    account_id: String,
    api_token: String,
    model: String,
}

#[derive(Deserialize)]
struct RunResponse {
    result: RunResult,
}

#[derive(Deserialize)]
struct RunResult {
    description: String,
}

/// What the prompt asks the model to answer with.
#[derive(Deserialize)]
#[serde(untagged)]
enum ModelAnswer {
    Fields { fields: serde_json::Value },
    Error { error: String },
}

impl WorkersAiExtractor {
    pub fn new(
        account_id: &str,
        api_token: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            account_id: account_id.to_string(),
            api_token: api_token.to_string(),
            model: model.to_string(),
        })
    }

    fn prompt(document_type: DocumentType) -> String {
        let fields = match document_type {
            DocumentType::Transcript => "full_name, school_name, academic_year, gpa (number, 10-point scale), conduct",
            DocumentType::Certificate => "full_name, certificate_name, issuer, issued_date, score (number)",
            DocumentType::Identity => "full_name, id_number, date_of_birth, place_of_origin",
            DocumentType::BirthCertificate => {
                "full_name, date_of_birth, place_of_birth, father_name, mother_name"
            }
        };
        format!(
            "This image is a Vietnamese student's {} submitted for school admission. \
             Extract these fields: {}. \
             Reply ONLY with JSON. On success reply {{\"fields\": {{...}}}}. \
             If the document cannot be read reply {{\"error\": CODE}} where CODE is one of \
             \"unreadable\", \"wrong_document\", \"low_quality\", \"incomplete\", \"invalid_content\".",
            document_type.as_ref().replace('_', " "),
            fields
        )
    }
}

#[async_trait]
impl Extractor for WorkersAiExtractor {
    async fn extract(
        &self,
        document: &[u8],
        document_type: DocumentType,
    ) -> Result<serde_json::Value, ExtractionFailure> {
        if sniff_media_type(document).is_none() {
            return Err(ExtractionFailure::new(
                FailureKind::InvalidFileType,
                "unrecognized file signature",
            ));
        }

        let url = format!(
            "https://api.cloudflare.com/client/v4/accounts/{}/ai/run/{}",
            self.account_id, self.model
        );

        let body = serde_json::json!({
            "image": base64::engine::general_purpose::STANDARD.encode(document),
            "prompt": Self::prompt(document_type),
            "max_tokens": 512
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ExtractionFailure::new(status_kind(status), format!("{status}: {text}")));
        }

        let run: RunResponse = response.json().await.map_err(transport_failure)?;
        interpret_answer(&run.result.description)
    }
}

fn transport_failure(err: reqwest::Error) -> ExtractionFailure {
    let kind = if err.is_timeout() || err.is_connect() || err.is_request() {
        FailureKind::Transient
    } else {
        FailureKind::Fatal
    };
    ExtractionFailure::new(kind, err.to_string())
}

fn status_kind(status: StatusCode) -> FailureKind {
    match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => FailureKind::Transient,
        StatusCode::PAYLOAD_TOO_LARGE | StatusCode::UNSUPPORTED_MEDIA_TYPE => {
            FailureKind::InvalidFileType
        }
        s if s.is_server_error() => FailureKind::Transient,
        _ => FailureKind::Fatal,
    }
}

fn interpret_answer(description: &str) -> Result<serde_json::Value, ExtractionFailure> {
    // Models sometimes wrap JSON in a markdown fence.
    let trimmed = description
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let answer: ModelAnswer = serde_json::from_str(trimmed).map_err(|e| {
        ExtractionFailure::new(FailureKind::Fatal, format!("unparseable model answer: {e}"))
    })?;

    match answer {
        ModelAnswer::Fields { fields } => Ok(fields),
        ModelAnswer::Error { error } => {
            let kind = match error.as_str() {
                "unreadable" => FailureKind::InvalidFormat,
                "wrong_document" => FailureKind::InvalidFileType,
                "low_quality" => FailureKind::QualityCheckFailed,
                "incomplete" => FailureKind::InformationMissing,
                _ => FailureKind::InvalidData,
            };
            Err(ExtractionFailure::new(kind, error))
        }
    }
}
