//! # Akuflow Scheduler
//!
//! The retention-email job. Each run walks the lifecycle stages in order
//! and, per stage, narrows signups down to the users who should hear from
//! us, renders their message, sends it, and records the attempt.
//!
//! ## Pipeline
//! ```text
//! RetentionJob::run(now)
//!   └── for stage in [Day1, Day3, Day7]          (a failing stage is reported, not fatal)
//!         ├── window::select_candidates           signups in the stage window, ≤ batch_size
//!         ├── filter::filter_candidates           drop recorded (user, stage) + opted-out users
//!         ├── personalize::personalize            streak / module / activity context
//!         └── dispatch::dispatch_stage            render → MailSender → RetentionEmailRecord
//! ```
//!
//! A record is written for every attempt, successful or not, so a failed
//! send is never retried automatically. Clearing the record is the only
//! way to make a user eligible again.

pub mod dispatch;
pub mod engine;
pub mod filter;
pub mod job;
pub mod message;
pub mod personalize;
pub mod window;

pub use dispatch::SendResult;
pub use engine::spawn_retention_loop;
pub use job::{JobReport, JobSummary, RetentionJob};
pub use personalize::{Candidate, StageContext};
pub use window::SignupWindow;
