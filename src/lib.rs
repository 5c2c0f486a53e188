pub mod assembler;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod envelope;
pub mod import_job;
pub mod model;
pub mod preflight;
pub mod reconciler;
pub mod staging;
pub mod store;
pub mod taxonomy;
