pub mod errors;
pub mod models;
pub mod policy;
pub mod reconciliation;
pub mod repositories;
pub mod types;
