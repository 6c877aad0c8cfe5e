//! Terminal output and prompts.

mod output;
pub mod prompts;

pub use output::{error, header, info, kv, success};
