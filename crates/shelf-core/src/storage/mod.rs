pub mod audio;
pub mod entries;
pub mod models;
pub mod passwords;
pub mod sqlite;
pub mod video;

pub use sqlite::Database;
