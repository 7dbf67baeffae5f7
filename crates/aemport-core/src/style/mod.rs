//! Style cascade resolution across component files and category-addressed
//! style bundles.

pub mod behavior;
pub mod bundle;
pub mod resolver;
pub mod rules;

pub use bundle::{BundleIndex, local_style_files, parse_descriptor_text};
pub use resolver::StyleCascadeResolver;
