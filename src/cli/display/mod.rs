//! Human-readable rendering helpers.

pub mod colors;
pub mod table;

pub use colors::{colorize_outcome, colorize_verdict};
pub use table::{key_value_table, list_table, render_list};
