pub mod cucumber_json;
pub mod schema;
pub mod writer;

pub use cucumber_json::{FeatureReport, compile, render};
pub use schema::{report_schema, validate_report};
pub use writer::ReportWriter;
