pub mod sqlite;
pub use sqlite::SqliteCardCollection;
