//! Contains logic for extracting the focused window and idle time from the desktop.
//! [GenericWindowManager] is the main artifact of this module that abstracts
//! the operations.

#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "x11")]
extern crate xcb;

use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;

/// Command recorded when the executable of a window can't be determined.
pub const UNKNOWN_PROCESS: &str = "Process not found";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// Transient condition, for example no window has focus right now.
    #[error("Window information unavailable: {0}")]
    Unavailable(String),

    #[error("Window probe failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveWindowData {
    /// Name of the window. For example 'bash in hello' or 'Document 1' or 'Vibing in YouTube -
    /// Chrome'
    pub window_title: Arc<str>,
    /// Full path to an executable. For example /home/etc/nvim
    pub process_name: Arc<str>,
}

/// Intended to serve as a contract desktop backends must implement.
#[cfg_attr(test, mockall::automock)]
pub trait WindowManager: Send {
    fn get_active_window_data(&mut self) -> Result<ActiveWindowData, ProbeError>;

    /// Retrieve amount of time user has been inactive in seconds
    fn get_idle_time(&mut self) -> Result<u32, ProbeError>;
}

/// Serves as a cross-compatible WindowManager implementation.
pub struct GenericWindowManager {
    inner: Box<dyn WindowManager>,
}

impl GenericWindowManager {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "x11")] {
                use x11::LinuxWindowManager;
                Ok(Self {
                    inner: Box::new(LinuxWindowManager::new()?),
                })
            }
            else {
                Err(anyhow::anyhow!(
                    "No window backend was compiled in, rebuild with `--features x11`"
                ))
            }
        }
    }
}

impl WindowManager for GenericWindowManager {
    fn get_active_window_data(&mut self) -> Result<ActiveWindowData, ProbeError> {
        self.inner.get_active_window_data()
    }

    fn get_idle_time(&mut self) -> Result<u32, ProbeError> {
        self.inner.get_idle_time()
    }
}
