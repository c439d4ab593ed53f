//! # session
//!
//! Wall-clock bookkeeping for one run. Three independent accumulators carry
//! fractional milliseconds forward between callbacks so converting
//! continuous time into whole cycles, ticks and frames never drifts.

use crate::config::RateConfig;

/// slack for float error when flooring a unit count; without it 1000ms at
/// 60Hz can come out as 59.999... ticks
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScheduledSession {
    pub running: bool,
    pub last_timestamp_ms: f64,
    pub cpu_accumulator_ms: f64,
    pub timer_accumulator_ms: f64,
    pub frame_accumulator_ms: f64,
}

/// What happened to a raw host delta on its way into the accumulators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delta {
    Normal(f64),
    /// clock went backwards (or produced NaN)
    Negative(f64),
    /// host was stalled; replaced by a nominal interval
    Stalled(f64),
}

impl Delta {
    /// the amount actually fed to the accumulators
    pub fn effective_ms(&self, config: &RateConfig) -> f64 {
        match self {
            Delta::Normal(d) => *d,
            Delta::Negative(_) => 0.0,
            Delta::Stalled(_) => config.frame_interval_ms(),
        }
    }
}

impl ScheduledSession {
    pub fn new(now: f64) -> Self {
        ScheduledSession {
            last_timestamp_ms: now,
            ..ScheduledSession::default()
        }
    }

    /// zero everything and re-anchor on `now`; running state is kept
    pub fn reset(&mut self, now: f64) {
        let running = self.running;
        *self = ScheduledSession::new(now);
        self.running = running;
    }

    /// begin (or resume) a run. cpu and timer progress survives a pause,
    /// only the frame accumulator starts over
    pub fn start(&mut self, now: f64) {
        self.running = true;
        self.last_timestamp_ms = now;
        self.frame_accumulator_ms = 0.0;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// take the elapsed time since the previous callback and classify it
    pub fn advance_clock(&mut self, now: f64, config: &RateConfig) -> Delta {
        let raw = now - self.last_timestamp_ms;
        self.last_timestamp_ms = now;
        if raw.is_nan() || raw < 0.0 {
            Delta::Negative(raw)
        } else if raw > config.stall_threshold_ms {
            Delta::Stalled(raw)
        } else {
            Delta::Normal(raw)
        }
    }

    pub fn accumulate(&mut self, delta_ms: f64) {
        self.cpu_accumulator_ms += delta_ms;
        self.timer_accumulator_ms += delta_ms;
        self.frame_accumulator_ms += delta_ms;
    }

    /// whole timer ticks owed; all of them are debited
    pub fn drain_timer_ticks(&mut self, timer_hz: u32) -> u32 {
        let hz = timer_hz as f64;
        let ticks = whole_units(self.timer_accumulator_ms * hz / 1000.0);
        if ticks > 0 {
            self.timer_accumulator_ms =
                (self.timer_accumulator_ms - ticks as f64 * 1000.0 / hz).max(0.0);
        }
        ticks
    }

    /// whole cpu cycles owed this callback, at most `cap`. nothing is
    /// debited until the client has actually run them
    pub fn cpu_cycles_due(&self, cycles_per_second: u32, cap: u32) -> u32 {
        let cps = cycles_per_second as f64;
        whole_units(self.cpu_accumulator_ms * cps / 1000.0).min(cap)
    }

    /// charge `cycles` that ran against the cpu accumulator
    pub fn debit_cpu_cycles(&mut self, cycles: u32, cycles_per_second: u32) {
        if cycles > 0 {
            let cps = cycles_per_second as f64;
            self.cpu_accumulator_ms =
                (self.cpu_accumulator_ms - cycles as f64 * 1000.0 / cps).max(0.0);
        }
    }

    /// true if a frame is due. exactly one interval is debited and the
    /// remainder carries, so an early callback is made up by a later one
    pub fn drain_frame(&mut self, target_fps: u32) -> bool {
        let interval = 1000.0 / target_fps as f64;
        if self.frame_accumulator_ms + EPSILON < interval {
            return false;
        }
        self.frame_accumulator_ms = (self.frame_accumulator_ms - interval).max(0.0);
        true
    }
}

fn whole_units(units: f64) -> u32 {
    let u = (units + EPSILON).floor();
    if u <= 0.0 {
        0
    } else if u >= u32::MAX as f64 {
        u32::MAX
    } else {
        u as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_zeroed() {
        let s = ScheduledSession::new(123.0);
        assert!(!s.running);
        assert_eq!(s.last_timestamp_ms, 123.0);
        assert_eq!(s.cpu_accumulator_ms, 0.0);
        assert_eq!(s.timer_accumulator_ms, 0.0);
        assert_eq!(s.frame_accumulator_ms, 0.0);
    }

    #[test]
    fn test_start_keeps_cpu_and_timer_progress() {
        let mut s = ScheduledSession::new(0.0);
        s.accumulate(5.0);
        s.start(100.0);
        assert_eq!(s.cpu_accumulator_ms, 5.0);
        assert_eq!(s.timer_accumulator_ms, 5.0);
        assert_eq!(s.frame_accumulator_ms, 0.0);
        assert_eq!(s.last_timestamp_ms, 100.0);
    }

    #[test]
    fn test_reset_keeps_running_flag() {
        let mut s = ScheduledSession::new(0.0);
        s.start(0.0);
        s.accumulate(7.5);
        s.reset(50.0);
        assert!(s.running);
        assert_eq!(s.cpu_accumulator_ms, 0.0);
        assert_eq!(s.last_timestamp_ms, 50.0);
    }

    #[test]
    fn test_clock_classification() {
        let cfg = RateConfig::default();
        let mut s = ScheduledSession::new(100.0);
        assert_eq!(s.advance_clock(50.0, &cfg), Delta::Negative(-50.0));
        assert_eq!(s.advance_clock(66.0, &cfg), Delta::Normal(16.0));
        assert_eq!(s.advance_clock(10_066.0, &cfg), Delta::Stalled(10_000.0));
        assert_eq!(s.last_timestamp_ms, 10_066.0);
        assert!(matches!(
            s.advance_clock(f64::NAN, &cfg),
            Delta::Negative(_)
        ));
    }

    #[test]
    fn test_stall_becomes_one_frame() {
        let cfg = RateConfig::default();
        assert_eq!(Delta::Stalled(5000.0).effective_ms(&cfg), 1000.0 / 60.0);
        assert_eq!(Delta::Negative(-3.0).effective_ms(&cfg), 0.0);
    }

    #[test]
    fn test_timer_ticks_exact_over_a_second() {
        let mut s = ScheduledSession::new(0.0);
        s.accumulate(1000.0);
        assert_eq!(s.drain_timer_ticks(60), 60);
        assert!(s.timer_accumulator_ms >= 0.0);
        assert!(s.timer_accumulator_ms < 1000.0 / 60.0);
    }

    #[test]
    fn test_cpu_debits_only_what_ran() {
        let mut s = ScheduledSession::new(0.0);
        s.accumulate(1000.0);
        let mut ran = Vec::new();
        loop {
            let due = s.cpu_cycles_due(1000, 400);
            if due == 0 {
                break;
            }
            s.debit_cpu_cycles(due, 1000);
            ran.push(due);
        }
        assert_eq!(ran, vec![400, 400, 200]);
        assert!(s.cpu_accumulator_ms < 1e-6);
    }

    #[test]
    fn test_cpu_due_is_not_debited() {
        let mut s = ScheduledSession::new(0.0);
        s.accumulate(100.0);
        assert_eq!(s.cpu_cycles_due(700, 10_000), 70);
        assert_eq!(s.cpu_accumulator_ms, 100.0);
        s.debit_cpu_cycles(35, 700);
        assert!((s.cpu_accumulator_ms - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_frame_debits_one_interval() {
        let mut s = ScheduledSession::new(0.0);
        s.accumulate(20.0);
        assert!(s.drain_frame(60));
        assert!((s.frame_accumulator_ms - (20.0 - 1000.0 / 60.0)).abs() < 1e-9);

        let mut s = ScheduledSession::new(0.0);
        s.accumulate(50.0);
        assert!(s.drain_frame(60));
        assert!((s.frame_accumulator_ms - (50.0 - 1000.0 / 60.0)).abs() < 1e-9);

        let mut s = ScheduledSession::new(0.0);
        s.accumulate(105.0);
        for left in [85.0, 65.0, 45.0, 25.0, 5.0] {
            assert!(s.drain_frame(50));
            assert!((s.frame_accumulator_ms - left).abs() < 1e-9);
        }
        assert!(!s.drain_frame(50));
    }

    #[test]
    fn test_early_frame_made_up_later() {
        let mut s = ScheduledSession::new(0.0);
        let mut frames = 0;
        for i in 0..60 {
            s.accumulate(if i % 2 == 0 { 15.0 } else { 18.4 });
            if s.drain_frame(60) {
                frames += 1;
            }
        }
        assert_eq!(frames, 59);
        assert!(s.frame_accumulator_ms < 1000.0 / 60.0 * 2.0);
    }
}
