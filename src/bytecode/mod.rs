pub mod auxdata;
mod comparator;

pub use auxdata::AuxData;
pub use comparator::{compare, Comparison};
