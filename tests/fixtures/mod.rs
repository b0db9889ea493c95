//! Sample documents and the fields an extraction engine would read from them.

#![allow(dead_code)]

use admission_docs::models::job::DocumentType;
use serde_json::{json, Value};

/// A document an applicant could upload.
#[derive(Debug, Clone)]
pub struct DocumentFixture {
    pub file_name: &'static str,
    pub document_type: DocumentType,
    pub bytes: &'static [u8],
    pub description: &'static str,
}

pub const PDF_BYTES: &[u8] = b"%PDF-1.7\n1 0 obj << /Type /Catalog >> endobj\n%%EOF";
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

pub const DOCUMENT_FIXTURES: &[DocumentFixture] = &[
    DocumentFixture {
        file_name: "hoc-ba-lop-12.pdf",
        document_type: DocumentType::Transcript,
        bytes: PDF_BYTES,
        description: "Grade 12 transcript, scanned to PDF",
    },
    DocumentFixture {
        file_name: "ielts.png",
        document_type: DocumentType::Certificate,
        bytes: PNG_BYTES,
        description: "Language certificate photo",
    },
    DocumentFixture {
        file_name: "cccd.jpg",
        document_type: DocumentType::Identity,
        bytes: JPEG_BYTES,
        description: "Citizen identity card, front side",
    },
    DocumentFixture {
        file_name: "giay-khai-sinh.pdf",
        document_type: DocumentType::BirthCertificate,
        bytes: PDF_BYTES,
        description: "Birth certificate copy",
    },
];

pub fn fixture(document_type: DocumentType) -> &'static DocumentFixture {
    DOCUMENT_FIXTURES
        .iter()
        .find(|f| f.document_type == document_type)
        .expect("every document type has a fixture")
}

/// Complete field map for `document_type`.
pub fn valid_fields(document_type: DocumentType) -> Value {
    match document_type {
        DocumentType::Transcript => json!({
            "full_name": "Nguyễn Văn An",
            "school_name": "THPT Chu Văn An",
            "academic_year": "2023-2024",
            "gpa": 8.7,
            "conduct": "Tốt"
        }),
        DocumentType::Certificate => json!({
            "full_name": "Nguyễn Văn An",
            "certificate_name": "IELTS Academic",
            "issuer": "British Council",
            "issued_date": "2024-03-15",
            "score": 7.0
        }),
        DocumentType::Identity => json!({
            "full_name": "Nguyễn Văn An",
            "id_number": "001206012345",
            "date_of_birth": "2006-05-20",
            "place_of_origin": "Hà Nội"
        }),
        DocumentType::BirthCertificate => json!({
            "full_name": "Nguyễn Văn An",
            "date_of_birth": "2006-05-20",
            "place_of_birth": "Bệnh viện Phụ sản Hà Nội",
            "father_name": "Nguyễn Văn Bình",
            "mother_name": "Trần Thị Cúc"
        }),
    }
}
