pub mod customer;
pub mod document;
pub mod payment;
pub mod product;
pub mod tax;

pub use customer::*;
pub use document::*;
pub use payment::*;
pub use product::*;
pub use tax::*;
