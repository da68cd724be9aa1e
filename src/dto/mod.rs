pub mod uom;
