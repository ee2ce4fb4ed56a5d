//! Kernel configuration
//!
//! Capacities are fixed at compile time; the few runtime knobs live in
//! [`KernelConfig`], which is handed to `Kernel::new`. The log level is
//! selected through cargo features:
//! - `log-error`, `log-warn`, `log-info` (default), `log-debug`, `log-trace`
//!
//! When several are enabled the most verbose one wins.

use log::LevelFilter;

use crate::error::{KernelError, Result};
use crate::memory::layout::PAGE_SIZE;

/// Task table capacity
pub const NR_TASKS: usize = 64;

/// Capacity of each per-task page list (user pages and table pages)
pub const MAX_PROCESS_PAGES: usize = 16;

/// Bytes per task page (control block, kernel stack and trap frame)
pub const THREAD_SIZE: usize = PAGE_SIZE;

/// Priority of the idle task, inherited by everything it creates
pub const DEFAULT_PRIORITY: i64 = 15;

/// Demand faults serviced before the handler starts refusing them
pub const DEFAULT_FAULT_LIMIT: usize = 64;

/// Compile-time maximum log level
pub const LOG_LEVEL: LevelFilter = if cfg!(feature = "log-trace") {
    LevelFilter::Trace
} else if cfg!(feature = "log-debug") {
    LevelFilter::Debug
} else if cfg!(feature = "log-info") {
    LevelFilter::Info
} else if cfg!(feature = "log-warn") {
    LevelFilter::Warn
} else if cfg!(feature = "log-error") {
    LevelFilter::Error
} else {
    LevelFilter::Off
};

/// Runtime kernel parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Priority (and first slice) of the idle task
    pub init_priority: i64,

    /// Global cap on serviced demand faults; `None` disables the cap
    pub fault_limit: Option<usize>,
}

impl KernelConfig {
    pub const fn new() -> Self {
        Self {
            init_priority: DEFAULT_PRIORITY,
            fault_limit: Some(DEFAULT_FAULT_LIMIT),
        }
    }

    pub const fn with_init_priority(mut self, priority: i64) -> Self {
        self.init_priority = priority;
        self
    }

    pub const fn with_fault_limit(mut self, limit: usize) -> Self {
        self.fault_limit = Some(limit);
        self
    }

    pub const fn without_fault_limit(mut self) -> Self {
        self.fault_limit = None;
        self
    }

    /// Reject settings the scheduler cannot work with
    ///
    /// Aging only makes progress with a positive priority.
    pub fn validate(&self) -> Result<()> {
        if self.init_priority <= 0 {
            return Err(KernelError::InvalidPriority(self.init_priority));
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KernelConfig::default();
        assert_eq!(config.init_priority, DEFAULT_PRIORITY);
        assert_eq!(config.fault_limit, Some(DEFAULT_FAULT_LIMIT));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = KernelConfig::new().with_fault_limit(3).with_init_priority(2);
        assert_eq!(config.fault_limit, Some(3));
        assert_eq!(config.init_priority, 2);
        assert_eq!(config.without_fault_limit().fault_limit, None);
    }

    #[test]
    fn test_non_positive_priority_rejected() {
        let config = KernelConfig::new().with_init_priority(0);
        assert_eq!(config.validate(), Err(KernelError::InvalidPriority(0)));
    }
}
