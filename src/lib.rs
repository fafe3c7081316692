//! moreright-assistant: LLM chat agent for the moreright forum
//!
//! This library provides:
//! - A multi-turn tool loop between an LLM and the forum's MCP tool server
//! - Wallet challenge/response authentication for gated tools
//! - Bounded conversation history with summarization
//! - Support for multiple LLM providers (Claude, OpenAI)

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod mcp;
pub mod tools;
pub mod transport;
pub mod wallet;

pub use config::Config;
