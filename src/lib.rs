//! Transparent tap proxy between an editor and a language server.
//!
//! The binary lives in `main.rs`; the crate is also a library so the
//! integration tests can drive whole sessions in-process.

pub mod config;
pub mod document;
pub mod error;
pub mod frame;
pub mod inject;
pub mod proxy;
pub mod rpc;
