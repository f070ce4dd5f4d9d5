pub mod details;
pub mod generator;
pub mod writer;

pub use details::{write_details, DayDetails};
pub use generator::ReportGenerator;
pub use writer::{report_path, write_report};
