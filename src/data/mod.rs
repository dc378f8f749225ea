// src/data/mod.rs — Dataset model and loading

pub mod loader;
pub mod table;

pub use loader::load_csv;
pub use table::{Aggregate, Record, Table, TableError};
