//! Admission document pipeline
//!
//! Applicants upload documents (transcripts, certificates, identity papers,
//! birth certificates); a worker extracts structured fields with Cloudflare
//! Workers AI, staff verify the extraction, and applicants are notified by
//! email and Telegram of every terminal outcome.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
pub mod telemetry;
