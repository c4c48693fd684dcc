//! Infrastructure implementations for Leadline.
//!
//! Implements the ports defined in `leadline-core`:
//! - `http` -- reqwest-backed `Transport`
//! - `sqlite` -- sqlx-backed `WorkflowStore`
//! - `config` -- TOML engine configuration loader

pub mod config;
pub mod http;
pub mod sqlite;
