//! Common types for the arremate workspace

mod secret;
mod error;
mod text;

pub use secret::Secret;
pub use error::{Error, Result};
pub use text::truncate;
