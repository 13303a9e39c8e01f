//! Orka LLM plugin - exposes `Chat` and `Complete` to the Orka host over a
//! loopback RPC port and forwards them to hosted LLM APIs.

pub mod args;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod llm;
pub mod router;
pub mod server;
