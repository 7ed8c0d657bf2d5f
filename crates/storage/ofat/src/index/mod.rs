//! In-memory search index over volume names

mod scan;
mod tree;

pub use scan::SearchIndex;
pub use tree::{IndexError, IndexKey, LocationSet, SearchTree, MAX_LOCATIONS_PER_KEY, MAX_NODES};
