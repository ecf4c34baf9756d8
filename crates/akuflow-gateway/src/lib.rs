//! # Akuflow Gateway
//!
//! HTTP surface of the retention job:
//!
//! | Route | Auth |
//! |---|---|
//! | `POST /api/cron/retention-emails` | cron bearer secret |
//! | `GET /api/cron/retention-emails` | public descriptor |
//! | `GET /health` | public |
//! | `GET /api/admin/retention/records` | admin, support |
//! | `GET /api/admin/retention/stats` | admin, support |
//! | `DELETE /api/admin/retention/records/{user_id}/{stage}` | admin |

pub mod auth;
pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
