//! Report generation for the final score and roadmap.

pub mod generator;

pub use generator::{generate_json_report, generate_markdown_report, ReportMetadata};
