pub mod content;

pub use content::content_hash;
