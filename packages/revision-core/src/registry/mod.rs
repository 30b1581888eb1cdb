//! Static registry of versioned record types, their fields and
//! relationship edges.

mod field;
mod record_type;
#[allow(clippy::module_inception)]
mod registry;
mod relationship;
pub(crate) mod validation;

pub use field::FieldDef;
pub use record_type::RecordType;
pub use registry::RecordRegistry;
pub use relationship::{Cardinality, EdgeDirection, RelationshipEdge};
