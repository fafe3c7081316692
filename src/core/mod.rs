//! Core domain types shared across the application

pub mod errors;

pub use errors::{AuthError, ContextError, WalletError};
