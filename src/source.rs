pub mod file;

pub use self::file::JsonLinesSource;
