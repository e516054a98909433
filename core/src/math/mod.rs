pub mod align;
pub mod stats;

pub use align::{pad_to, pad_to_common_length};
pub use stats::{Moments, StatsHelper};
