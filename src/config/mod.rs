//! Configuration management for Lintel
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files. It combines settings for the shell server, the bar,
//! input translation, and the display client.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration struct containing all Lintel settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LintelConfig {
    /// Shell server settings (socket, limits, timers)
    #[serde(default)]
    pub shell: ShellConfig,

    /// Top bar appearance
    #[serde(default)]
    pub bar: BarConfig,

    /// Input translation (repeat, click counting)
    #[serde(default)]
    pub input: InputConfig,

    /// Display client limits and timeouts
    #[serde(default)]
    pub client: ClientConfig,
}

/// Shell server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShellConfig {
    /// Path of the Unix socket applications connect to
    pub socket_path: PathBuf,

    /// Maximum number of concurrently connected applications
    pub max_sessions: usize,

    /// Maximum number of status items a single application may own
    pub max_status_items_per_app: usize,

    /// Largest accepted channel frame (bytes)
    pub max_message_bytes: u32,

    /// Delay used to coalesce bursts of changes into one redraw (milliseconds)
    pub redraw_coalesce_ms: u64,

    /// Probe interval when pidfd watching is unavailable (milliseconds)
    pub liveness_poll_ms: u64,

    /// strftime-style format of the bar clock
    pub clock_format: String,
}

/// Top bar configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BarConfig {
    /// Bar width (pixels)
    pub width: u32,

    /// Bar height (pixels)
    pub height: u32,

    /// Background color (hex: #RRGGBB)
    pub background: String,

    /// Foreground color for titles and icons
    pub foreground: String,

    /// Highlight behind the active application's name
    pub active_background: String,
}

/// Input configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InputConfig {
    /// Keyboard repeat delay (milliseconds)
    pub keyboard_repeat_delay: u32,

    /// Keyboard repeat rate (per second, 0 disables repeat)
    pub keyboard_repeat_rate: u32,

    /// Window in which a press counts toward a multi-click (milliseconds)
    pub double_click_ms: u64,

    /// Maximum pointer travel between presses of a multi-click (pixels)
    pub double_click_radius: f64,
}

/// Display client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Maximum number of outstanding surfaces per client
    pub max_surfaces: usize,

    /// How long `connect` waits for the compositor to advertise a seat
    pub seat_discovery_timeout_ms: u64,

    /// Interval of the compositor heartbeat ping (milliseconds)
    pub heartbeat_ms: u64,

    /// Longest a message to the shell may wait for socket space (milliseconds)
    pub shell_send_timeout_ms: u64,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_sessions: 64,
            max_status_items_per_app: 32,
            max_message_bytes: 64 * 1024,
            redraw_coalesce_ms: 16,
            liveness_poll_ms: 500,
            clock_format: "%H:%M".to_string(),
        }
    }
}

impl Default for BarConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 28,
            background: "#1F2937".to_string(),
            foreground: "#F9FAFB".to_string(),
            active_background: "#7C3AED".to_string(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            keyboard_repeat_delay: 600,
            keyboard_repeat_rate: 25,
            double_click_ms: 400,
            double_click_radius: 5.0,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_surfaces: 64,
            seat_discovery_timeout_ms: 1000,
            heartbeat_ms: 1000,
            shell_send_timeout_ms: 1000,
        }
    }
}

impl ShellConfig {
    pub fn redraw_coalesce(&self) -> Duration {
        Duration::from_millis(self.redraw_coalesce_ms)
    }

    pub fn liveness_poll(&self) -> Duration {
        Duration::from_millis(self.liveness_poll_ms)
    }
}

impl InputConfig {
    pub fn repeat_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.keyboard_repeat_delay))
    }

    pub fn double_click_window(&self) -> Duration {
        Duration::from_millis(self.double_click_ms)
    }
}

impl ClientConfig {
    pub fn seat_discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.seat_discovery_timeout_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn shell_send_timeout(&self) -> Duration {
        Duration::from_millis(self.shell_send_timeout_ms)
    }
}

/// Socket the shell listens on when none is configured.
///
/// Prefers `$XDG_RUNTIME_DIR`, which is private to the user session.
pub fn default_socket_path() -> PathBuf {
    match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir).join("lintel-shell.sock"),
        _ => PathBuf::from("/tmp/lintel-shell.sock"),
    }
}

/// Parse a `#RRGGBB` color into its components
pub fn parse_hex_color(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

impl LintelConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Expand ~ to home directory
        let expanded_path = if path.to_string_lossy().starts_with('~') {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            let rest = path.strip_prefix("~").unwrap_or(path);
            Path::new(&home).join(rest)
        } else {
            path.to_path_buf()
        };

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: LintelConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.shell.max_sessions == 0 {
            anyhow::bail!("Invalid max_sessions: must be at least 1");
        }

        if self.shell.max_status_items_per_app == 0 {
            anyhow::bail!("Invalid max_status_items_per_app: must be at least 1");
        }

        // A frame must at least hold its kind byte
        if self.shell.max_message_bytes < 1 {
            anyhow::bail!("Invalid max_message_bytes: must be at least 1");
        }

        if self.shell.clock_format.is_empty() {
            anyhow::bail!("Invalid clock_format: must not be empty");
        }

        if self.bar.width == 0 || self.bar.height == 0 {
            anyhow::bail!(
                "Invalid bar size {}x{}: both dimensions must be positive",
                self.bar.width,
                self.bar.height
            );
        }

        for (name, color) in [
            ("background", &self.bar.background),
            ("foreground", &self.bar.foreground),
            ("active_background", &self.bar.active_background),
        ] {
            if parse_hex_color(color).is_none() {
                anyhow::bail!("Invalid bar {} color: {}", name, color);
            }
        }

        if self.input.double_click_radius < 0.0 || !self.input.double_click_radius.is_finite() {
            anyhow::bail!("Invalid double_click_radius: must be a non-negative number");
        }

        if self.input.keyboard_repeat_rate > 1000 {
            anyhow::bail!("Invalid keyboard_repeat_rate: must be at most 1000 per second");
        }

        if self.client.max_surfaces == 0 {
            anyhow::bail!("Invalid max_surfaces: must be at least 1");
        }

        if self.client.heartbeat_ms == 0 {
            anyhow::bail!("Invalid heartbeat_ms: must be positive");
        }

        if self.client.shell_send_timeout_ms == 0 {
            anyhow::bail!("Invalid shell_send_timeout_ms: must be positive");
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}
