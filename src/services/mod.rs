//! Business logic services

pub mod audit;
pub mod cancellation;
pub mod field_mapper;
pub mod import_pipeline;
pub mod import_queue;
pub mod importer;
pub mod pdf;
pub mod pg_store;
pub mod pricing;
pub mod quote_code;
pub mod report;
pub mod spreadsheet;
pub mod storage;
pub mod template;

#[cfg(test)]
pub mod memory_store;
