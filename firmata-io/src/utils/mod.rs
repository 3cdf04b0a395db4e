//! Contains transverse utilities.

pub mod helpers;

pub use helpers::format_as_hex;
