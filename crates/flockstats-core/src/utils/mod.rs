//! Display helpers for the text front ends.

pub mod format;

pub use format::{format_count, format_date, format_money, format_percent, truncate_string};
