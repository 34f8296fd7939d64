//! Application-wide constants for convwatch.
//!
//! # Categories
//!
//! - **Events**: Names of the events the presentation layer depends on
//! - **Defaults**: Fallback configuration values
//! - **Environment**: Variables read by the config loader and the binary

// ============================================================================
// Events
// ============================================================================

/// A line of task output. Args: `(text: string)`.
pub const EVENT_LOG_MESSAGE: &str = "log_message";

/// Task progress. Args: `(fraction: number in [0,1], label: string)`.
pub const EVENT_PROGRESS: &str = "progress";

/// Terminal task state. Args: `(success: boolean)`.
pub const EVENT_DONE: &str = "done";

/// Interactive challenge. Args: `(image_ref: string)`.
///
/// The reply is a bare string sent over the raw path, never a frame.
pub const EVENT_CAPTCHA: &str = "captcha";

/// Outbound handshake frame of the ready-handshake variant. No args.
pub const EVENT_USER_READY: &str = "user_ready";

// ============================================================================
// Defaults
// ============================================================================

/// Placeholder replaced by the ticket in a ready-handshake target URL.
pub const TICKET_PLACEHOLDER: &str = "{ticket}";

/// Default connection target (the converter's interactive watch endpoint).
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8085/ws/inter/{ticket}";

/// Config file name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Application directory name under the platform config dir.
pub const APP_DIR_NAME: &str = "convwatch";

// ============================================================================
// Environment
// ============================================================================

/// Overrides the config directory.
pub const ENV_CONFIG_DIR: &str = "CONVWATCH_CONFIG_DIR";

/// Overrides `Config::server_url`.
pub const ENV_URL: &str = "CONVWATCH_URL";

/// Overrides `Config::handshake` (`ready` or `ticket-push`).
pub const ENV_HANDSHAKE: &str = "CONVWATCH_HANDSHAKE";

/// Overrides `Config::captcha_dir`.
pub const ENV_CAPTCHA_DIR: &str = "CONVWATCH_CAPTCHA_DIR";

/// When set, log output goes to this file instead of stderr.
pub const ENV_LOG_FILE: &str = "CONVWATCH_LOG_FILE";
