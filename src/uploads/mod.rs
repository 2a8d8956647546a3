pub mod measurements;
pub mod models;
