//! # host
//!
//! The driver loop that sits outside the scheduler: it owns the wall clock,
//! feeds timestamps in, draws when told to, keeps the buzzer in step with the
//! sound timer and turns host events into scheduler calls.
//!
//! `pulse` is one timing callback and can be driven with made-up timestamps;
//! `run` paces pulses against a monotonic clock with spin_sleep.

use crate::client::EmulatorClient;
use crate::display::Renderer;
use crate::input::{HostEvent, KeySource};
use crate::scheduler::{RenderDecision, Scheduler, SchedulerError, StartStatus, StepStatus, Tick};
use crate::sound::{AudioGate, Sound, SoundError};
use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("rendering failed: {0}")]
    Render(#[source] io::Error),
    #[error("reading input failed: {0}")]
    Input(#[source] io::Error),
    #[error("reading program failed: {0}")]
    Load(#[source] io::Error),
    #[error(transparent)]
    Sound(#[from] SoundError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

pub struct Host<C: EmulatorClient, R: Renderer, S: Sound> {
    scheduler: Scheduler<C>,
    renderer: R,
    audio: AudioGate<S>,
    keys: Option<Box<dyn KeySource>>,
    origin: Instant,
    quit: bool,
    frames: u64,
}

impl<C: EmulatorClient, R: Renderer, S: Sound> Host<C, R, S> {
    pub fn new(scheduler: Scheduler<C>, renderer: R, audio: AudioGate<S>) -> Self {
        Host {
            scheduler,
            renderer,
            audio,
            keys: None,
            origin: Instant::now(),
            quit: false,
            frames: 0,
        }
    }

    pub fn with_keys(mut self, keys: impl KeySource + 'static) -> Self {
        self.keys = Some(Box::new(keys));
        self
    }

    pub fn scheduler(&self) -> &Scheduler<C> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler<C> {
        &mut self.scheduler
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn audio(&self) -> &AudioGate<S> {
        &self.audio
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    /// milliseconds on the host clock
    pub fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    /// load and immediately start running
    pub fn boot(&mut self, program: &[u8]) -> Result<(), HostError> {
        let now = self.now_ms();
        self.scheduler.load_program(program, now)?;
        self.scheduler.start(now);
        Ok(())
    }

    /// read a whole program from e.g. a ROM file, then boot it
    pub fn boot_from(&mut self, reader: &mut impl io::Read) -> Result<(), HostError> {
        let mut program = Vec::new();
        reader.read_to_end(&mut program).map_err(HostError::Load)?;
        self.boot(&program)
    }

    /// One timing pulse: pending host events, one scheduler callback, a
    /// frame if one is due, then the audio gate. An idle pulse leaves the
    /// audio gate alone, so no tone device is opened before the first run.
    pub fn pulse(&mut self, now: f64) -> Result<Option<Tick>, HostError> {
        self.poll_keys(now)?;

        let tick = match self.scheduler.on_callback(now) {
            Ok(tick) => tick,
            Err(e) => {
                // the fault is what the caller needs to see
                if let Err(se) = self.audio.update(false) {
                    log::error!("silencing after fault: {}", se);
                }
                return Err(e.into());
            }
        };

        if let Some(t) = tick {
            if t.render == RenderDecision::Render {
                self.draw()?;
            }
            self.audio.update(t.should_sound())?;
        }
        Ok(tick)
    }

    pub fn handle_event(&mut self, event: HostEvent, now: f64) -> Result<(), HostError> {
        match event {
            HostEvent::KeyDown(key) => {
                self.scheduler.press_key(key);
            }
            HostEvent::KeyUp(key) => {
                self.scheduler.release_key(key);
            }
            HostEvent::TogglePause => {
                if self.scheduler.is_running() {
                    self.scheduler.stop();
                    self.audio.update(false)?;
                } else if self.scheduler.start(now) == StartStatus::NoProgramLoaded {
                    log::warn!("can't run, no program loaded");
                }
            }
            HostEvent::Step => match self.scheduler.step()? {
                StepStatus::Stepped(c) => {
                    log::info!("pc {:#06x} st {}", c.program_counter, c.sound_timer);
                    self.draw()?;
                }
                StepStatus::Running => log::info!("pause before stepping"),
                StepStatus::NoProgramLoaded => log::warn!("can't step, no program loaded"),
            },
            HostEvent::Reset => {
                self.scheduler.reset(now)?;
                self.draw()?;
            }
            HostEvent::ToggleMute => self.audio.toggle_mute()?,
            HostEvent::Quit => {
                log::info!("quit requested");
                self.scheduler.stop();
                self.audio.update(false)?;
                self.quit = true;
            }
        }
        Ok(())
    }

    /// Pulse at the target frame rate until quit or an emulator fault. A late
    /// pulse is not made up for; the scheduler already accounts for the
    /// time that passed.
    pub fn run(&mut self) -> Result<(), HostError> {
        let interval =
            Duration::from_secs_f64(self.scheduler.config().frame_interval_ms() / 1000.0);
        let mut next = Instant::now();
        while !self.quit {
            let now = self.now_ms();
            if let Err(e) = self.pulse(now) {
                if let Err(te) = self.audio.teardown() {
                    log::error!("{}", te);
                }
                return Err(e);
            }

            next += interval;
            let wall = Instant::now();
            if next > wall {
                spin_sleep::sleep(next - wall);
            } else {
                next = wall;
            }
        }
        self.audio.teardown()?;
        log::info!("rendered {} frames", self.frames);
        Ok(())
    }

    fn poll_keys(&mut self, now: f64) -> Result<(), HostError> {
        let events = match self.keys.as_mut() {
            Some(keys) => keys.poll_events().map_err(HostError::Input)?,
            None => return Ok(()),
        };
        for event in events {
            self.handle_event(event, now)?;
        }
        Ok(())
    }

    fn draw(&mut self) -> Result<(), HostError> {
        self.renderer
            .render(self.scheduler.client().framebuffer())
            .map_err(HostError::Render)?;
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientCall, ClientError, DummyClient};
    use crate::config::RateConfig;
    use crate::display::DummyRenderer;
    use crate::input::DummyKeys;
    use crate::sound::Mute;

    /// a tone device that can start but never stop
    struct Stuck;

    impl Sound for Stuck {
        fn beep(&mut self) -> Result<(), SoundError> {
            Ok(())
        }
        fn stop(&mut self) -> Result<(), SoundError> {
            Err(SoundError::Device("device unplugged".to_string()))
        }
    }

    fn host() -> Host<DummyClient, DummyRenderer, Mute> {
        let _ = env_logger::builder().is_test(true).try_init();
        let scheduler = Scheduler::new(DummyClient::new(), RateConfig::default()).unwrap();
        Host::new(scheduler, DummyRenderer::new(), AudioGate::new(Mute::open))
    }

    fn running_host() -> Host<DummyClient, DummyRenderer, Mute> {
        let mut h = host();
        h.scheduler_mut().load_program(&[0x00, 0xe0], 0.0).unwrap();
        h.scheduler_mut().start(0.0);
        h.scheduler_mut().client_mut().calls.clear();
        h
    }

    #[test]
    fn test_pulse_renders_at_frame_rate() -> Result<(), HostError> {
        let mut h = running_host();
        h.scheduler_mut().client_mut().set_pixel(3, 4);
        let mut now = 0.0;
        for _ in 0..10 {
            now += 8.0;
            h.pulse(now)?;
        }
        // 80ms at 60fps
        assert_eq!(h.frames_rendered(), 4);
        assert_eq!(h.renderer().frames, 4);
        assert_eq!(h.renderer().lit_pixels, 1);
        Ok(())
    }

    #[test]
    fn test_idle_pulse_does_nothing() -> Result<(), HostError> {
        let mut h = host();
        assert_eq!(h.pulse(100.0)?, None);
        assert_eq!(h.frames_rendered(), 0);
        assert!(!h.audio().is_sounding());
        assert!(!h.audio().is_open());

        h.scheduler_mut().load_program(&[0x00, 0xe0], 100.0)?;
        assert_eq!(h.pulse(116.0)?, None);
        assert!(!h.audio().is_open());
        h.scheduler_mut().start(116.0);
        h.pulse(132.0)?;
        assert!(h.audio().is_open());
        Ok(())
    }

    #[test]
    fn test_buzzer_follows_sound_timer_and_mute() -> Result<(), HostError> {
        let mut h = running_host();
        h.scheduler_mut().client_mut().sound = 3;
        h.pulse(16.0)?;
        assert!(h.audio().is_sounding());

        h.handle_event(HostEvent::ToggleMute, 20.0)?;
        assert!(!h.audio().is_sounding());
        h.handle_event(HostEvent::ToggleMute, 21.0)?;
        assert!(h.audio().is_sounding());

        // three ticks later the timer has run out
        h.pulse(66.0)?;
        assert!(!h.audio().is_sounding());
        Ok(())
    }

    #[test]
    fn test_pause_silences() -> Result<(), HostError> {
        let mut h = running_host();
        h.scheduler_mut().client_mut().sound = 200;
        h.pulse(16.0)?;
        assert!(h.audio().is_sounding());
        h.handle_event(HostEvent::TogglePause, 17.0)?;
        assert!(!h.scheduler().is_running());
        assert!(!h.audio().is_sounding());
        assert_eq!(h.pulse(33.0)?, None);
        assert!(!h.audio().is_sounding());
        Ok(())
    }

    #[test]
    fn test_keys_reach_client_before_callback() -> Result<(), HostError> {
        let mut h = running_host().with_keys(DummyKeys::new(vec![vec![
            HostEvent::KeyDown(0x5),
            HostEvent::KeyUp(0x5),
            HostEvent::KeyDown(0xa),
        ]]));
        h.pulse(20.0)?;
        let calls = &h.scheduler().client().calls;
        assert_eq!(
            calls[..3],
            [
                ClientCall::SetInputMask(0x0020),
                ClientCall::SetInputMask(0x0000),
                ClientCall::SetInputMask(0x0400),
            ]
        );
        assert_eq!(calls[3], ClientCall::AdvanceTimers(1));
        assert_eq!(h.scheduler().input_mask(), 0x0400);
        Ok(())
    }

    #[test]
    fn test_step_draws_while_paused() -> Result<(), HostError> {
        let mut h = running_host();
        h.handle_event(HostEvent::Step, 1.0)?;
        assert_eq!(h.frames_rendered(), 0);
        h.handle_event(HostEvent::TogglePause, 2.0)?;
        h.handle_event(HostEvent::Step, 3.0)?;
        assert_eq!(h.frames_rendered(), 1);
        assert_eq!(
            h.scheduler().client().calls,
            vec![ClientCall::AdvanceCpu(1)]
        );
        Ok(())
    }

    #[test]
    fn test_fault_surfaces_and_stops() {
        let mut h = running_host();
        h.scheduler_mut().client_mut().sound = 100;
        h.scheduler_mut().client_mut().fault = Some(ClientError::StackOverflow { addr: 0x2a0 });
        let r = h.pulse(50.0);
        assert!(matches!(
            r,
            Err(HostError::Scheduler(SchedulerError::EmulatorFault(
                ClientError::StackOverflow { addr: 0x2a0 }
            )))
        ));
        assert!(!h.scheduler().is_running());
        assert!(!h.audio().is_sounding());
    }

    #[test]
    fn test_fault_not_masked_by_sound_error() -> Result<(), HostError> {
        let scheduler = Scheduler::new(DummyClient::new(), RateConfig::default()).unwrap();
        let mut h = Host::new(scheduler, DummyRenderer::new(), AudioGate::new(|| Ok(Stuck)));
        h.boot(&[0x00, 0xe0])?;
        let t0 = h.scheduler().session().last_timestamp_ms;
        h.scheduler_mut().client_mut().sound = 100;
        h.pulse(t0 + 16.0)?;
        assert!(h.audio().is_sounding());

        h.scheduler_mut().client_mut().fault = Some(ClientError::StackUnderflow { addr: 0x2ee });
        let r = h.pulse(t0 + 33.0);
        assert!(matches!(
            r,
            Err(HostError::Scheduler(SchedulerError::EmulatorFault(
                ClientError::StackUnderflow { addr: 0x2ee }
            )))
        ));
        assert!(!h.scheduler().is_running());
        Ok(())
    }

    #[test]
    fn test_quit_stops_loop() -> Result<(), HostError> {
        let mut h = running_host().with_keys(DummyKeys::new(vec![vec![HostEvent::Quit]]));
        h.run()?;
        assert!(h.quit_requested());
        assert!(!h.scheduler().is_running());
        assert!(!h.audio().is_open());
        Ok(())
    }

    #[test]
    fn test_reset_event_zeroes_session() -> Result<(), HostError> {
        let mut h = running_host();
        h.pulse(10.0)?;
        h.handle_event(HostEvent::Reset, 12.0)?;
        let s = h.scheduler().session();
        assert_eq!(s.timer_accumulator_ms, 0.0);
        assert_eq!(s.last_timestamp_ms, 12.0);
        assert!(h.scheduler().is_running());
        Ok(())
    }

    #[test]
    fn test_boot_from_reader() -> Result<(), HostError> {
        let mut h = host();
        let mut prog: &[u8] = &[0x00, 0xe0]; // clear screen
        h.boot_from(&mut prog)?;
        assert!(h.scheduler().is_running());
        assert!(h
            .scheduler()
            .client()
            .calls
            .contains(&ClientCall::LoadProgram(2)));
        Ok(())
    }

    #[test]
    fn test_boot_starts_running() -> Result<(), HostError> {
        let mut h = host();
        h.boot(&[0x12, 0x00])?;
        assert!(h.scheduler().is_running());
        assert!(h.scheduler().is_program_loaded());
        Ok(())
    }
}
