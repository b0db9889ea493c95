use garde::Validate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::job::DocumentType;

/// Fields read from a school transcript (học bạ).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TranscriptFields {
    #[garde(length(min = 1, max = 200))]
    pub full_name: String,

    #[garde(length(min = 1, max = 200))]
    pub school_name: String,

    #[garde(length(min = 4, max = 20))]
    pub academic_year: String,

    /// Overall grade point average on the 10-point scale.
    #[garde(range(min = 0.0, max = 10.0))]
    pub gpa: f64,

    #[garde(skip)]
    pub conduct: Option<String>,
}

/// Fields read from an award or language certificate.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CertificateFields {
    #[garde(length(min = 1, max = 200))]
    pub full_name: String,

    #[garde(length(min = 1, max = 200))]
    pub certificate_name: String,

    #[garde(length(min = 1, max = 200))]
    pub issuer: String,

    #[garde(length(min = 4, max = 30))]
    pub issued_date: String,

    #[garde(skip)]
    pub score: Option<f64>,
}

/// Fields read from a national identity card.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IdentityFields {
    #[garde(length(min = 1, max = 200))]
    pub full_name: String,

    #[garde(length(min = 9, max = 12), custom(digits_only))]
    pub id_number: String,

    #[garde(length(min = 4, max = 30))]
    pub date_of_birth: String,

    #[garde(skip)]
    pub place_of_origin: Option<String>,
}

/// Fields read from a birth certificate.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BirthCertificateFields {
    #[garde(length(min = 1, max = 200))]
    pub full_name: String,

    #[garde(length(min = 4, max = 30))]
    pub date_of_birth: String,

    #[garde(length(min = 1, max = 300))]
    pub place_of_birth: String,

    #[garde(skip)]
    pub father_name: Option<String>,

    #[garde(skip)]
    pub mother_name: Option<String>,
}

fn digits_only(value: &str, _ctx: &()) -> garde::Result {
    if value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(garde::Error::new("must contain digits only"))
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FieldError {
    #[error("required fields missing: {0:?}")]
    Missing(Vec<String>),

    #[error("extracted fields are invalid: {0}")]
    Invalid(String),
}

/// Checks raw extraction output against the schema for `document_type` and
/// returns the normalized field map.
pub fn validate_fields(
    document_type: DocumentType,
    raw: serde_json::Value,
) -> Result<serde_json::Value, FieldError> {
    match document_type {
        DocumentType::Transcript => {
            typed::<TranscriptFields>(raw, &["full_name", "school_name", "academic_year", "gpa"])
        }
        DocumentType::Certificate => typed::<CertificateFields>(
            raw,
            &["full_name", "certificate_name", "issuer", "issued_date"],
        ),
        DocumentType::Identity => {
            typed::<IdentityFields>(raw, &["full_name", "id_number", "date_of_birth"])
        }
        DocumentType::BirthCertificate => typed::<BirthCertificateFields>(
            raw,
            &["full_name", "date_of_birth", "place_of_birth"],
        ),
    }
}

fn typed<T>(raw: serde_json::Value, required: &[&str]) -> Result<serde_json::Value, FieldError>
where
    T: DeserializeOwned + Serialize + Validate<Context = ()>,
{
    let object = raw
        .as_object()
        .ok_or_else(|| FieldError::Invalid("expected a JSON object".to_string()))?;

    let missing: Vec<String> = required
        .iter()
        .filter(|key| match object.get(**key) {
            None | Some(serde_json::Value::Null) => true,
            Some(serde_json::Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .map(|key| key.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(FieldError::Missing(missing));
    }

    let fields: T =
        serde_json::from_value(raw).map_err(|e| FieldError::Invalid(e.to_string()))?;
    fields
        .validate()
        .map_err(|report| FieldError::Invalid(report.to_string()))?;

    serde_json::to_value(&fields).map_err(|e| FieldError::Invalid(e.to_string()))
}
