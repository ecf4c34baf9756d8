//! # Akuflow Core
//!
//! Shared configuration, error type, domain model, and the collaborator
//! traits the retention job is written against.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::AkuflowConfig;
pub use error::{AkuflowError, Result};
pub use traits::{MailSender, RetentionStore};
