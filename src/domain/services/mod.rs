pub mod calculator;
pub mod category_split;

pub use calculator::{calculate, performance_delta};
pub use category_split::{split_totals, CategorySplit};
