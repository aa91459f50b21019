//! Database queries

pub mod audit;
pub mod company;
pub mod import_job;
pub mod product;
pub mod quote;
pub mod supplier;
pub mod user;
