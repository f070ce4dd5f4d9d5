pub mod review;
pub mod topic;
pub mod report;

pub use review::*;
pub use topic::*;
pub use report::*;
