//! Shared helpers: constants and URL utilities.

pub mod constants;
pub mod url_utils;

pub use constants::*;
pub use url_utils::*;
