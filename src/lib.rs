//! Multibeam scatters one chat prompt across several AI models over the same
//! OpenAI-compatible streaming API and compares the answers side by side.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the beam scatter/gather coordinator, the streaming
//!   service it dispatches rays through, provider/model selection, the
//!   conversation transcript, and configuration.
//! - [`api`] defines the chat and model-list payloads used by the streaming
//!   client and provider code.
//! - [`cli`] parses arguments and drives one-shot beam runs.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
