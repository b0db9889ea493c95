pub mod api;
pub mod extracted;
pub mod fields;
pub mod job;
pub mod notification;
pub mod reason;
