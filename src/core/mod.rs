pub mod beam;
pub mod builtin_providers;
pub mod chat_stream;
pub mod config;
pub mod conversation;
pub mod message;
pub mod providers;
