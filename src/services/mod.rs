// Immutable conversion graph built from a point-in-time read of storage
pub mod conversion_graph;

// Unit registry and conversion operations
pub mod uom;

pub use conversion_graph::{GraphSnapshot, UnitList};
pub use uom::UomService;
