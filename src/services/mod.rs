pub mod files;
pub mod models;
pub mod processing;
pub mod report;
