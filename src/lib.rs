//! # Lintel Desktop Shell Library
//!
//! The session protocol between applications and the desktop shell.
//!
//! ## Architecture
//!
//! Lintel is split into two halves that talk over one Unix socket:
//! - `client`: the display client linked into applications (compositor
//!   connection, surfaces, input translation, shell channel)
//! - `shell`: the shell server that owns the top bar (application menus,
//!   the status tray, liveness tracking, bar rendering)
//! - `channel`: the framed binary protocol both halves speak
//! - `input`: raw seat events to uniform input events
//! - `surface`: surface handle registry and lifecycle
//! - `config`: configuration parsing and management
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lintel::shell::{service, LogPresenter, ShellService};
//! use lintel::LintelConfig;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LintelConfig::default();
//!     let listener = service::bind(&config.shell.socket_path)?;
//!     let service = ShellService::new(&config.shell, LogPresenter::new());
//!     service.run(listener, async { let _ = tokio::signal::ctrl_c().await; }).await
//! }
//! ```

pub mod channel;
pub mod client;
pub mod config;
pub mod input;
pub mod shell;
pub mod surface;
pub mod timer;

// Re-export main types for easy access
pub use channel::{ChannelError, MenuNode, Message, ProcessId, StatusHandle, StatusItemPayload};
pub use client::{ClientEvent, ConnectError, DisplayClient, ShellClient};
pub use config::LintelConfig;
pub use input::{InputEvent, InputTranslator};
pub use shell::{ShellError, ShellServer, ShellService};
pub use surface::{Size, SurfaceError, SurfaceHandle, SurfaceRegistry};

// Re-export common error types
pub use anyhow::{Context, Error, Result};

/// Version information for Lintel
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
