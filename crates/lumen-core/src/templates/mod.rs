//! Part-decomposition templates and the prompts derived from them.

mod matcher;
mod prompts;

pub use matcher::{resolve, Template, TEMPLATES};
pub use prompts::{canonical_prompt, part_phrase};
