/// Expression engine built on evalexpr
pub mod evalexpr;
/// Ordered state vectors for numeric consumers
pub mod vector;
