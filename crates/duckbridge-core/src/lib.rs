//! Shared building blocks for the duckbridge crates
//!
//! Kept free of axum and reqwest so the domain crates can describe their
//! errors without depending on the HTTP stack.

mod error;
mod time;

pub use error::{ErrorBody, ErrorDetail, HttpError, error_body};
pub use time::unix_now;
