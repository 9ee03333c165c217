//! Secret handling utilities.
//!
//! Re-exports secrecy types used for the database URL and processor token.

pub use secrecy::{ExposeSecret, SecretString};
