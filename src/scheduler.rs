//! # scheduler
//!
//! Turns a stream of host timestamps into bounded units of work at three
//! independent rates:
//!
//! * timers tick at `timer_hz` and are never capped; they are cheap and must
//!   not lose real elapsed time
//! * the cpu runs at `cycles_per_second`, at most `max_cycles_per_callback`
//!   per callback; when the host can't keep up the cpu falls behind rather
//!   than bursting
//! * frames are due at `target_fps`, whatever the cpu is doing
//!
//! Order inside one callback is always timers, cpu, render decision. The
//! scheduler never sleeps or re-schedules itself, so it can be driven with
//! made-up timestamps.

use crate::client::{ClientError, EmulatorClient, Quirks, PLACEHOLDER_PC};
use crate::config::{ConfigError, RateConfig};
use crate::input::InputState;
use crate::session::{Delta, ScheduledSession};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// the emulated machine failed; the run has been stopped
    #[error("emulator fault: {0}")]
    EmulatorFault(#[from] ClientError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderDecision {
    Render,
    Skip,
}

/// what the ui shows next to the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub sound_timer: u8,
    pub program_counter: u16,
}

/// The work done by one callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub render: RenderDecision,
    pub timer_ticks: u32,
    pub cycles: u32,
    pub counters: Counters,
}

impl Tick {
    /// sound state before the mute policy is applied
    pub fn should_sound(&self) -> bool {
        self.counters.sound_timer > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartStatus {
    Started,
    NoProgramLoaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Stepped(Counters),
    /// stepping and running are mutually exclusive
    Running,
    NoProgramLoaded,
}

pub struct Scheduler<C: EmulatorClient> {
    client: C,
    config: RateConfig,
    quirks: Quirks,
    session: ScheduledSession,
    input: InputState,
    program_loaded: bool,
    has_pc: bool,
}

impl<C: EmulatorClient> Scheduler<C> {
    pub fn new(client: C, config: RateConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let has_pc = client.has_program_counter();
        if !has_pc {
            log::info!(
                "emulator has no program counter, reporting {:#06x}",
                PLACEHOLDER_PC
            );
        }
        Ok(Scheduler {
            client,
            config,
            quirks: Quirks::default(),
            session: ScheduledSession::default(),
            input: InputState::new(),
            program_loaded: false,
            has_pc,
        })
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn config(&self) -> &RateConfig {
        &self.config
    }

    pub fn quirks(&self) -> Quirks {
        self.quirks
    }

    pub fn session(&self) -> &ScheduledSession {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        self.session.running
    }

    pub fn is_program_loaded(&self) -> bool {
        self.program_loaded
    }

    pub fn input_mask(&self) -> u16 {
        self.input.mask()
    }

    pub fn set_rate_config(&mut self, config: RateConfig) -> Result<(), ConfigError> {
        if self.session.running {
            return Err(ConfigError::SessionRunning);
        }
        config.validate()?;
        log::info!(
            "rate config: {} cycles/s, timers {}Hz, {}fps, cap {} cycles/callback",
            config.cycles_per_second,
            config.timer_hz,
            config.target_fps,
            config.max_cycles_per_callback
        );
        self.config = config;
        Ok(())
    }

    /// quirks reach the client straight away, and again before every load
    pub fn set_quirks(&mut self, quirks: Quirks) -> Result<(), ConfigError> {
        if self.session.running {
            return Err(ConfigError::SessionRunning);
        }
        log::info!("quirks: {}", quirks);
        self.quirks = quirks;
        self.client.set_quirks(quirks);
        Ok(())
    }

    /// Stops any run, then quirks, reset and load go to the client in that
    /// order. The session starts over from `now`.
    pub fn load_program(&mut self, program: &[u8], now: f64) -> Result<(), SchedulerError> {
        self.session.stop();
        self.program_loaded = false;
        self.client.set_quirks(self.quirks);
        self.client.reset()?;
        self.client.load_program(program)?;
        self.input.push(&mut self.client);
        self.session.reset(now);
        self.program_loaded = true;
        log::info!("loaded {} byte program", program.len());
        Ok(())
    }

    /// Machine reset: every accumulator goes back to zero. A running session
    /// keeps running from the fresh machine state.
    pub fn reset(&mut self, now: f64) -> Result<(), SchedulerError> {
        self.client.reset()?;
        self.input.push(&mut self.client);
        self.session.reset(now);
        log::debug!("machine reset");
        Ok(())
    }

    /// Begin or resume running. Cpu and timer progress left over from before
    /// a pause is kept.
    pub fn start(&mut self, now: f64) -> StartStatus {
        if !self.program_loaded {
            log::info!("nothing to run, load a program first");
            return StartStatus::NoProgramLoaded;
        }
        self.session.start(now);
        log::debug!("running from {:.3}ms", now);
        StartStatus::Started
    }

    /// safe to call at any time; accumulators are left alone
    pub fn stop(&mut self) {
        if self.session.running {
            log::debug!("stopped");
        }
        self.session.stop();
    }

    /// one host timing pulse. `Ok(None)` when not running
    pub fn on_callback(&mut self, now: f64) -> Result<Option<Tick>, SchedulerError> {
        if !self.session.running {
            return Ok(None);
        }

        let delta = self.session.advance_clock(now, &self.config);
        match delta {
            Delta::Normal(_) => {}
            Delta::Negative(raw) => log::debug!("clock went backwards by {:.3}ms", -raw),
            Delta::Stalled(raw) => log::debug!(
                "host stalled for {:.3}ms, counting it as {:.3}ms",
                raw,
                self.config.frame_interval_ms()
            ),
        }
        self.session.accumulate(delta.effective_ms(&self.config));

        let timer_ticks = self.session.drain_timer_ticks(self.config.timer_hz);
        if timer_ticks > 0 {
            if let Err(e) = self.client.advance_timers(timer_ticks) {
                return Err(self.fault(e));
            }
        }

        let cycles = self.session.cpu_cycles_due(
            self.config.cycles_per_second,
            self.config.max_cycles_per_callback,
        );
        if cycles > 0 {
            if let Err(e) = self.client.advance_cpu(cycles) {
                return Err(self.fault(e));
            }
            self.session.debit_cpu_cycles(cycles, self.config.cycles_per_second);
        }

        let render = if self.session.drain_frame(self.config.target_fps) {
            RenderDecision::Render
        } else {
            RenderDecision::Skip
        };

        Ok(Some(Tick {
            render,
            timer_ticks,
            cycles,
            counters: self.counters(),
        }))
    }

    /// Run exactly one instruction while stopped. Accumulators are not
    /// touched.
    pub fn step(&mut self) -> Result<StepStatus, SchedulerError> {
        if self.session.running {
            return Ok(StepStatus::Running);
        }
        if !self.program_loaded {
            log::info!("nothing to step, load a program first");
            return Ok(StepStatus::NoProgramLoaded);
        }
        if let Err(e) = self.client.advance_cpu(1) {
            return Err(self.fault(e));
        }
        let counters = self.counters();
        log::trace!("step -> pc {:#06x}", counters.program_counter);
        Ok(StepStatus::Stepped(counters))
    }

    pub fn press_key(&mut self, key: u8) -> bool {
        self.input.press(key, &mut self.client)
    }

    pub fn release_key(&mut self, key: u8) -> bool {
        self.input.release(key, &mut self.client)
    }

    pub fn release_all_keys(&mut self) {
        self.input.clear(&mut self.client)
    }

    pub fn counters(&self) -> Counters {
        Counters {
            sound_timer: self.client.sound_timer(),
            program_counter: if self.has_pc {
                self.client.program_counter()
            } else {
                PLACEHOLDER_PC
            },
        }
    }

    fn fault(&mut self, e: ClientError) -> SchedulerError {
        log::error!("{}, stopping", e);
        self.session.stop();
        SchedulerError::EmulatorFault(e)
    }
}
