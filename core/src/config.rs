// storekeep/src/config.rs

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound on how long a transaction waits for a single row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Remaining stock at or below which sellers get a low-stock alert.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 5;

/// How the post-commit fan-out is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
  /// Await the sink before returning to the caller.
  #[default]
  Inline,
  /// Spawn the sink on the tokio runtime and return immediately.
  Background,
}

impl FromStr for DispatchMode {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "inline" => Ok(DispatchMode::Inline),
      "background" => Ok(DispatchMode::Background),
      other => Err(format!("unknown dispatch mode '{}', expected 'inline' or 'background'", other)),
    }
  }
}

impl fmt::Display for DispatchMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DispatchMode::Inline => f.write_str("inline"),
      DispatchMode::Background => f.write_str("background"),
    }
  }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
  pub lock_timeout: Duration,
  pub low_stock_threshold: i32,
  pub dispatch: DispatchMode,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      lock_timeout: DEFAULT_LOCK_TIMEOUT,
      low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
      dispatch: DispatchMode::default(),
    }
  }
}

impl EngineConfig {
  pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
    self.lock_timeout = lock_timeout;
    self
  }

  pub fn with_low_stock_threshold(mut self, threshold: i32) -> Self {
    self.low_stock_threshold = threshold;
    self
  }

  pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
    self.dispatch = dispatch;
    self
  }
}
