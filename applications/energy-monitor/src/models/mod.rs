pub mod reading;

pub use reading::{FuelType, NewReading, Reading, ReadingStats};
