//! BIBFRAME RDF/XML documents.
//!
//! - [`xml`] — owned element tree read and written with `quick-xml`
//! - [`bibframe`] — Work and Instance extraction
//! - [`patch`] — identifier replacement and Hub linking

pub mod bibframe;
pub mod patch;
pub mod xml;

pub use bibframe::{extract_works, instances_of};
pub use patch::{HubLink, PatchSet};
pub use xml::{Document, Element, Node, RDF_NS, RDFS_NS};
