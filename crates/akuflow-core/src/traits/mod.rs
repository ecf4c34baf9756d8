//! Collaborator traits the retention job depends on.

pub mod mail;
pub mod store;

pub use mail::MailSender;
pub use store::RetentionStore;
