//! Content-addressed style dedup: [`Style`] records interned
//! into a [`RefCountedSet`], addressed by a 16-bit [`Id`].

mod refcounted_set;
mod style;

pub use refcounted_set::{AddError, AddOutcome, Id, RefCountedSet};
pub use style::{Color, Style, StyleFlags, Underline};

/// A page's style table: `Style` values deduplicated behind ref-counted ids.
pub type StyleSet = RefCountedSet<Style>;
