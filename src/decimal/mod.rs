// Fixed-point money arithmetic
pub mod fixed;

pub use fixed::{quantize, DecimalError, FixedDecimal, IntoFixed, SCALE};
