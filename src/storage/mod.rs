pub mod lock;
pub mod sqlite;

pub use lock::AppLock;
pub use sqlite::Storage;
