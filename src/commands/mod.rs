pub mod analyze;
pub mod tidy;
