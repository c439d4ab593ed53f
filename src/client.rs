//! # client
//!
//! The emulator itself is an opaque collaborator: the scheduler only ever
//! talks to it through [`EmulatorClient`]. Anything that can reset, load a
//! program, run N instruction-equivalents and decrement its timers by N ticks
//! can be driven.
//!
//! The display is the classic 64x32 grid, one byte per pixel, values 0 or 1.

use std::fmt;
use thiserror::Error;

pub const DISPLAY_WIDTH: usize = 64;
pub const DISPLAY_HEIGHT: usize = 32;

/// one byte per pixel, row-major
pub type Framebuffer = [u8; DISPLAY_WIDTH * DISPLAY_HEIGHT];

/// reported when the client has no way of telling us where it is
pub const PLACEHOLDER_PC: u16 = 0x0000;

/// where CHIP-8 programs are conventionally loaded
pub const PROGRAM_ADDR: u16 = 0x0200;

/// Failures surfaced by the emulated machine. These are faults in the
/// program being run (or the client), never timing problems.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("invalid opcode {opcode:#06x} at {addr:#06x}")]
    InvalidOpcode { opcode: u16, addr: u16 },
    #[error("stack overflow at {addr:#06x}")]
    StackOverflow { addr: u16 },
    #[error("stack underflow at {addr:#06x}")]
    StackUnderflow { addr: u16 },
    #[error("program of {len} bytes does not fit in memory")]
    ProgramTooLarge { len: usize },
    #[error("emulator fault: {0}")]
    Other(String),
}

/// Behavioural flags selecting between historically divergent readings of
/// a handful of instructions. The scheduler never interprets them, it only
/// hands them to the client before a program is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Quirks {
    /// 8XY6/8XYE shift VX in place instead of copying VY first
    pub shift: bool,
    /// FX55/FX65 leave I untouched
    pub load_store: bool,
    /// BNNN jumps to XNN + VX instead of NNN + V0
    pub jump: bool,
    /// 8XY1/8XY2/8XY3 reset VF to zero
    pub vf_reset: bool,
}

impl Quirks {
    pub const COSMAC_VIP: Quirks = Quirks {
        shift: false,
        load_store: false,
        jump: false,
        vf_reset: true,
    };

    pub const SUPER_CHIP: Quirks = Quirks {
        shift: true,
        load_store: true,
        jump: true,
        vf_reset: false,
    };

    pub const MODERN: Quirks = Quirks {
        shift: true,
        load_store: true,
        jump: false,
        vf_reset: false,
    };

    /// look up one of the named presets; case-insensitive
    pub fn from_preset_name(name: &str) -> Option<Quirks> {
        match name.to_ascii_lowercase().as_str() {
            "chip8" | "chip-8" | "vip" | "cosmac" => Some(Quirks::COSMAC_VIP),
            "schip" | "superchip" | "super-chip" => Some(Quirks::SUPER_CHIP),
            "modern" => Some(Quirks::MODERN),
            _ => None,
        }
    }
}

impl fmt::Display for Quirks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "shift={} load_store={} jump={} vf_reset={}",
            self.shift, self.load_store, self.jump, self.vf_reset
        )
    }
}

/// Capability interface of the emulated machine.
///
/// `advance_cpu` and `advance_timers` must run to completion without
/// sleeping; pacing is entirely the scheduler's business.
pub trait EmulatorClient {
    /// return to a defined initial state; callable at any time
    fn reset(&mut self) -> Result<(), ClientError>;

    /// replace program memory
    fn load_program(&mut self, program: &[u8]) -> Result<(), ClientError>;

    /// one bit per key, bit N set means key N is held
    fn set_input_mask(&mut self, mask: u16);

    /// execute exactly `cycles` instruction-equivalents
    fn advance_cpu(&mut self, cycles: u32) -> Result<(), ClientError>;

    /// decrement delay and sound timers by `ticks`, floored at zero
    fn advance_timers(&mut self, ticks: u32) -> Result<(), ClientError>;

    fn set_quirks(&mut self, quirks: Quirks);

    fn framebuffer(&self) -> &Framebuffer;

    fn sound_timer(&self) -> u8;

    /// Whether [`EmulatorClient::program_counter`] is meaningful. Asked once,
    /// when the scheduler is built.
    fn has_program_counter(&self) -> bool {
        false
    }

    fn program_counter(&self) -> u16 {
        PLACEHOLDER_PC
    }
}

/// One call as seen by [`DummyClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    Reset,
    LoadProgram(usize),
    SetInputMask(u16),
    AdvanceCpu(u32),
    AdvanceTimers(u32),
    SetQuirks(Quirks),
}

/// Records every call and keeps just enough machine state to be useful for
/// testing the scheduler: a sound timer that counts down with timer ticks
/// and a program counter that moves two bytes per cycle.
pub struct DummyClient {
    pub calls: Vec<ClientCall>,
    pub sound: u8,
    pub pc: u16,
    pub with_pc: bool,
    /// fail the next advance_cpu with this
    pub fault: Option<ClientError>,
    framebuffer: Box<Framebuffer>,
}

impl DummyClient {
    pub fn new() -> Self {
        DummyClient {
            calls: Vec::new(),
            sound: 0,
            pc: PROGRAM_ADDR,
            with_pc: true,
            fault: None,
            framebuffer: Box::new([0; DISPLAY_WIDTH * DISPLAY_HEIGHT]),
        }
    }

    /// a client without the program counter capability
    pub fn without_pc() -> Self {
        DummyClient {
            with_pc: false,
            ..DummyClient::new()
        }
    }

    pub fn cycles_run(&self) -> u64 {
        self.calls
            .iter()
            .map(|c| match c {
                ClientCall::AdvanceCpu(n) => *n as u64,
                _ => 0,
            })
            .sum()
    }

    pub fn timer_ticks(&self) -> u64 {
        self.calls
            .iter()
            .map(|c| match c {
                ClientCall::AdvanceTimers(n) => *n as u64,
                _ => 0,
            })
            .sum()
    }

    /// light up a single pixel so renderers have something to draw
    pub fn set_pixel(&mut self, x: usize, y: usize) {
        self.framebuffer[y * DISPLAY_WIDTH + x] = 1;
    }
}

impl Default for DummyClient {
    fn default() -> Self {
        DummyClient::new()
    }
}

impl EmulatorClient for DummyClient {
    fn reset(&mut self) -> Result<(), ClientError> {
        self.calls.push(ClientCall::Reset);
        self.sound = 0;
        self.pc = PROGRAM_ADDR;
        self.framebuffer.fill(0);
        Ok(())
    }

    fn load_program(&mut self, program: &[u8]) -> Result<(), ClientError> {
        if program.len() > 0x1000 - PROGRAM_ADDR as usize {
            return Err(ClientError::ProgramTooLarge { len: program.len() });
        }
        self.calls.push(ClientCall::LoadProgram(program.len()));
        Ok(())
    }

    fn set_input_mask(&mut self, mask: u16) {
        self.calls.push(ClientCall::SetInputMask(mask));
    }

    fn advance_cpu(&mut self, cycles: u32) -> Result<(), ClientError> {
        if let Some(e) = self.fault.take() {
            return Err(e);
        }
        self.calls.push(ClientCall::AdvanceCpu(cycles));
        self.pc = self.pc.wrapping_add((cycles as u16).wrapping_mul(2));
        Ok(())
    }

    fn advance_timers(&mut self, ticks: u32) -> Result<(), ClientError> {
        self.calls.push(ClientCall::AdvanceTimers(ticks));
        self.sound = self.sound.saturating_sub(ticks.min(u8::MAX as u32) as u8);
        Ok(())
    }

    fn set_quirks(&mut self, quirks: Quirks) {
        self.calls.push(ClientCall::SetQuirks(quirks));
    }

    fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    fn sound_timer(&self) -> u8 {
        self.sound
    }

    fn has_program_counter(&self) -> bool {
        self.with_pc
    }

    fn program_counter(&self) -> u16 {
        self.pc
    }
}
