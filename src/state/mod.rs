/// State management module
///
/// This module handles all persisted application state:
/// - Shared data structures (data.rs)
/// - The SQLite document database (library.rs)
/// - Typed CRUD over images, histories and imports (records.rs)
/// - Number-aware name ordering for listings (sort.rs)

pub mod data;
pub mod library;
pub mod records;
pub mod sort;
