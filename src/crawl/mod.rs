//! Declarative path crawling over hierarchical records
//!
//! Mapping metadata names every value by a slash-separated path such as
//! `Feature/geometry/location[0]/pos`; the crawler resolves it without any
//! per-field traversal code.

pub mod crawler;
pub mod path;

pub use crawler::{crawl, locator_id, Crawler};
pub use path::{Body, PathExpression, Step};
