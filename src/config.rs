//! # config
//!
//! Rates the scheduler converts wall-clock time into. A config is fixed for
//! the life of a run; the scheduler only accepts a new one while stopped.

use thiserror::Error;

pub const DEFAULT_CYCLES_PER_SECOND: u32 = 700;
pub const DEFAULT_TIMER_HZ: u32 = 60;
pub const DEFAULT_TARGET_FPS: u32 = 60;
pub const DEFAULT_MAX_CYCLES_PER_CALLBACK: u32 = 10_000;

/// deltas above this are treated as the host having stalled (backgrounded
/// tab, debugger, suspended laptop) rather than real elapsed time
pub const DEFAULT_STALL_THRESHOLD_MS: f64 = 1000.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("stall threshold must be a positive number of milliseconds, got {0}")]
    StallThreshold(f64),
    #[error("cannot change configuration while the session is running")]
    SessionRunning,
    #[error("can't parse {key}={value:?}")]
    Env { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateConfig {
    pub cycles_per_second: u32,
    pub timer_hz: u32,
    pub target_fps: u32,
    pub max_cycles_per_callback: u32,
    pub stall_threshold_ms: f64,
}

impl Default for RateConfig {
    fn default() -> Self {
        RateConfig {
            cycles_per_second: DEFAULT_CYCLES_PER_SECOND,
            timer_hz: DEFAULT_TIMER_HZ,
            target_fps: DEFAULT_TARGET_FPS,
            max_cycles_per_callback: DEFAULT_MAX_CYCLES_PER_CALLBACK,
            stall_threshold_ms: DEFAULT_STALL_THRESHOLD_MS,
        }
    }
}

impl RateConfig {
    pub fn with_cycles_per_second(cycles_per_second: u32) -> Self {
        RateConfig {
            cycles_per_second,
            ..RateConfig::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cycles_per_second == 0 {
            return Err(ConfigError::Zero("cycles_per_second"));
        }
        if self.timer_hz == 0 {
            return Err(ConfigError::Zero("timer_hz"));
        }
        if self.target_fps == 0 {
            return Err(ConfigError::Zero("target_fps"));
        }
        if self.max_cycles_per_callback == 0 {
            return Err(ConfigError::Zero("max_cycles_per_callback"));
        }
        if !(self.stall_threshold_ms > 0.0) {
            return Err(ConfigError::StallThreshold(self.stall_threshold_ms));
        }
        Ok(())
    }

    /// how long one frame lasts at the target rate
    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / self.target_fps as f64
    }

    /// Defaults, overridden by `CHIP8_CPS`, `CHIP8_TIMER_HZ`, `CHIP8_FPS`,
    /// `CHIP8_MAX_CYCLES` and `CHIP8_STALL_MS` when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = RateConfig::default();
        let cfg = RateConfig {
            cycles_per_second: env_parse(&lookup, "CHIP8_CPS", d.cycles_per_second)?,
            timer_hz: env_parse(&lookup, "CHIP8_TIMER_HZ", d.timer_hz)?,
            target_fps: env_parse(&lookup, "CHIP8_FPS", d.target_fps)?,
            max_cycles_per_callback: env_parse(
                &lookup,
                "CHIP8_MAX_CYCLES",
                d.max_cycles_per_callback,
            )?,
            stall_threshold_ms: env_parse(&lookup, "CHIP8_STALL_MS", d.stall_threshold_ms)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Env { key, value: v }),
    }
}
