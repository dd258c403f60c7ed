//! mcproxy Core - Fundamental types shared by every crate

mod error;
mod types;
mod version;

pub use error::*;
pub use types::*;
pub use version::*;
