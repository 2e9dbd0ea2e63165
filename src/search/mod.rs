mod fuzzy;
mod related;

pub use fuzzy::{FuzzyOptions, SearchIndex};
pub use related::find_related;
