//! Configuration for the tunnel proxy.
//!
//! Settings are read once at startup from an INI file; a small subset
//! (statistics cadence, idle threshold, credentials) can be re-read at
//! runtime on SIGHUP.

mod settings;

pub use settings::{
    AuthSettings, LogSettings, Mode, ProxySettings, Reloadable, Settings, PASSWORD_MAX_LENGTH,
    USERNAME_MAX_LENGTH,
};
