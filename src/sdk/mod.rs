//! Ergonomic client wrapping session, transport and configuration.
pub mod client;

pub use client::MiioClient;
