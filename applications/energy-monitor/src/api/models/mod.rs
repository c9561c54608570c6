pub mod consumption;

#[allow(unused_imports)]
pub use consumption::*;
