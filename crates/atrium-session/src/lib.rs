//! Session configuration for Atrium.
//!
//! A [`Session`] is the process-wide table of configuration values derived
//! from environment variables: which project, asset and task are active,
//! where the database lives, how long to wait for it, and so on.
//!
//! # Modules
//!
//! - [`keys`]: the documented table of recognized keys and their defaults
//! - [`env`]: the [`Environment`] seam over process variables
//! - [`session`]: [`Session`] itself, plus [`SharedSession`]
//! - [`error`]: error types

pub mod env;
pub mod error;
pub mod keys;
pub mod session;

pub use env::{login_name, Environment, MapEnvironment, ProcessEnvironment};
pub use error::{Result, SessionError};
pub use session::{Session, SharedSession, SESSION_SCHEMA};
