pub mod uom;
pub mod uom_conversion;
