//! lacuna-common — Shared error type and the sandboxed HTTP client used by every
//! Lacuna crate that talks to the network.

pub mod error;
pub mod sandbox;

pub use error::{LacunaError, Result};
pub use sandbox::SandboxClient;
