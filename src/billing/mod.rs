pub mod convert;
pub mod numbering;
pub mod totals;
