pub mod database;
pub mod dates;
pub mod excel_processor;
pub mod grid;
pub mod row_processing;
pub mod structure;
pub mod utils;
