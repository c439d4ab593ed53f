//!
//! ## Design
//!
//! * the emulator itself is a black box behind `client::EmulatorClient`;
//!   this crate only decides *when* it runs and how much
//! * cpu, 60Hz timers and rendering each run at their own rate, driven from
//!   one wall-clock timestamp per host pulse
//! * fractional milliseconds are carried forward, never rounded away, so
//!   there is no drift
//! * no unbounded catch-up: the cpu is capped per pulse and a stall counts as
//!   a single frame
//! * abstract display, input and audio so alternatives can be plugged in;
//!   terminal implementations via TUI/crossterm and the PC speaker
//!
//! Model
//!
//! ```text
//! Host
//!  |-- scheduler(client, rate config, quirks)
//!  |    |-- session: running flag, last timestamp, cpu/timer/frame accumulators
//!  |    `-- input state: 16 bit key mask, pushed to the client on every change
//!  |-- renderer
//!  |-- audio gate(tone device, mute)
//!  `-- main loop
//!       |-- handle host events (keys, pause, step, reset, mute, quit)
//!       |-- tick = scheduler.on_callback(now)
//!       |     // timers first, then cpu (capped), then the render decision
//!       |-- if tick.render { renderer.render(client.framebuffer()) }
//!       |-- audio.update(running && sound_timer > 0)
//!       `-- sleep until the next frame interval
//! ```

pub mod client;
pub mod config;
pub mod display;
pub mod host;
pub mod input;
pub mod scheduler;
pub mod session;
pub mod sound;

pub use client::{ClientError, EmulatorClient, Framebuffer, Quirks};
pub use config::{ConfigError, RateConfig};
pub use host::{Host, HostError};
pub use scheduler::{
    Counters, RenderDecision, Scheduler, SchedulerError, StartStatus, StepStatus, Tick,
};
