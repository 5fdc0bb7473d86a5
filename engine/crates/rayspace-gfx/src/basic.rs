pub mod bytes;
pub mod math;
