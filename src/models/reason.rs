use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::models::job::DocumentType;

/// User-facing cause attached to every job that ends anywhere but `completed`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationFailedReason {
    DocumentNotUploaded,
    DocumentUploadFailed,
    DocumentProcessingFailed,
    DocumentProcessingFailedInvalidData,
    DocumentProcessingFailedInvalidFormat,
    DocumentProcessingFailedInvalidFileType,
    DocumentQualityCheckFailed,
    InformationMissing,
    DocumentNotFound,
    UserCancelled,
    UserNotFound,
}

/// Language used for notification text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Locale {
    En,
    #[default]
    Vi,
}

impl ApplicationFailedReason {
    /// Localized message shown to the applicant.
    pub fn message(self, locale: Locale) -> &'static str {
        use ApplicationFailedReason::*;
        match locale {
            Locale::En => match self {
                DocumentNotUploaded => "The document has not been uploaded yet.",
                DocumentUploadFailed => "The document could not be uploaded. Please try again.",
                DocumentProcessingFailed => {
                    "The document could not be processed. Please try again later."
                }
                DocumentProcessingFailedInvalidData => {
                    "The document contains data that could not be read correctly."
                }
                DocumentProcessingFailedInvalidFormat => {
                    "The document format is not readable. Please upload a clearer copy."
                }
                DocumentProcessingFailedInvalidFileType => {
                    "This file type is not supported. Please upload a PDF, JPEG, PNG or WebP file."
                }
                DocumentQualityCheckFailed => {
                    "The document did not pass the quality check. Please upload a sharper, complete scan."
                }
                InformationMissing => "Some required information is missing from the document.",
                DocumentNotFound => "The uploaded document could not be found.",
                UserCancelled => "Document processing was cancelled at your request.",
                UserNotFound => "The applicant account for this document no longer exists.",
            },
            Locale::Vi => match self {
                DocumentNotUploaded => "Hồ sơ chưa được tải lên.",
                DocumentUploadFailed => "Tải hồ sơ lên không thành công. Vui lòng thử lại.",
                DocumentProcessingFailed => "Không thể xử lý hồ sơ. Vui lòng thử lại sau.",
                DocumentProcessingFailedInvalidData => {
                    "Hồ sơ chứa dữ liệu không hợp lệ, không thể đọc chính xác."
                }
                DocumentProcessingFailedInvalidFormat => {
                    "Định dạng hồ sơ không đọc được. Vui lòng tải lên bản rõ nét hơn."
                }
                DocumentProcessingFailedInvalidFileType => {
                    "Loại tệp không được hỗ trợ. Vui lòng tải lên tệp PDF, JPEG, PNG hoặc WebP."
                }
                DocumentQualityCheckFailed => {
                    "Hồ sơ không đạt yêu cầu chất lượng. Vui lòng tải lên bản quét rõ và đầy đủ."
                }
                InformationMissing => "Hồ sơ còn thiếu thông tin bắt buộc.",
                DocumentNotFound => "Không tìm thấy hồ sơ đã tải lên.",
                UserCancelled => "Việc xử lý hồ sơ đã được hủy theo yêu cầu của bạn.",
                UserNotFound => "Tài khoản thí sinh của hồ sơ này không còn tồn tại.",
            },
        }
    }
}

/// Message sent when a document of the given type was extracted successfully.
pub fn success_message(document_type: DocumentType, locale: Locale) -> &'static str {
    match locale {
        Locale::En => match document_type {
            DocumentType::Transcript => {
                "Your transcript was processed successfully and is awaiting verification."
            }
            DocumentType::Certificate => {
                "Your certificate was processed successfully and is awaiting verification."
            }
            DocumentType::Identity => {
                "Your identity document was processed successfully and is awaiting verification."
            }
            DocumentType::BirthCertificate => {
                "Your birth certificate was processed successfully and is awaiting verification."
            }
        },
        Locale::Vi => match document_type {
            DocumentType::Transcript => "Học bạ của bạn đã được xử lý thành công và đang chờ xác minh.",
            DocumentType::Certificate => {
                "Chứng chỉ của bạn đã được xử lý thành công và đang chờ xác minh."
            }
            DocumentType::Identity => {
                "Giấy tờ tùy thân của bạn đã được xử lý thành công và đang chờ xác minh."
            }
            DocumentType::BirthCertificate => {
                "Giấy khai sinh của bạn đã được xử lý thành công và đang chờ xác minh."
            }
        },
    }
}

/// Subject line for an outcome notification.
pub fn subject(document_type: DocumentType, succeeded: bool, locale: Locale) -> String {
    match (locale, succeeded) {
        (Locale::En, true) => format!("Your {} has been processed", document_type.label(locale)),
        (Locale::En, false) => format!("Action needed: your {}", document_type.label(locale)),
        (Locale::Vi, true) => format!("{} của bạn đã được xử lý", document_type.label(locale)),
        (Locale::Vi, false) => format!("Cần bổ sung: {} của bạn", document_type.label(locale)),
    }
}

/// Reference lines appended to written notifications.
pub fn reference_details(
    locale: Locale,
    application_id: &str,
    document_type: DocumentType,
    job_id: Uuid,
) -> String {
    let (application, document, reference) = match locale {
        Locale::En => ("Application", "Document", "Reference"),
        Locale::Vi => ("Hồ sơ", "Giấy tờ", "Mã tham chiếu"),
    };
    format!(
        "{application}: {application_id}\n{document}: {}\n{reference}: {job_id}",
        document_type.label(locale)
    )
}
