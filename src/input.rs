use crate::client::EmulatorClient;
use crossterm::event::{poll, read, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::terminal;
use std::collections::HashMap;
use std::io;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// map of characters read from the keyboard to what the chip8 might expect
/// where '1' => 0x01 and 'a' => 0x0a
pub const CHIP8_LITERAL_KEYMAP: [(char, u8); 16] = [
    ('0', 0x00),
    ('1', 0x01),
    ('2', 0x02),
    ('3', 0x03),
    ('4', 0x04),
    ('5', 0x05),
    ('6', 0x06),
    ('7', 0x07),
    ('8', 0x08),
    ('9', 0x09),
    ('a', 0x0a),
    ('b', 0x0b),
    ('c', 0x0c),
    ('d', 0x0d),
    ('e', 0x0e),
    ('f', 0x0f),
];

/// ditto using left-hand side of qwerty keyboard
pub const CHIP8_CONVENTIONAL_KEYMAP: [(char, u8); 16] = [
    ('x', 0x00), // x
    ('1', 0x01), // 1
    ('2', 0x02), // 2
    ('3', 0x03), // 3
    ('q', 0x04), // q
    ('w', 0x05), // w
    ('e', 0x06), // e
    ('a', 0x07), // a
    ('s', 0x08), // s
    ('d', 0x09), // d
    ('z', 0x0a), // z
    ('c', 0x0b), // c
    ('4', 0x0c), // 4
    ('r', 0x0d), // r
    ('f', 0x0e), // f
    ('v', 0x0f), // v
];

/// The pressed-key mask. Every transition is pushed to the emulator straight
/// away; programs that poll with tight timing break if presses are batched.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InputState {
    mask: u16,
}

impl InputState {
    pub fn new() -> Self {
        InputState { mask: 0 }
    }

    pub fn mask(&self) -> u16 {
        self.mask
    }

    /// returns false (and pushes nothing) for keys outside 0x0..=0xf
    pub fn press(&mut self, key: u8, client: &mut impl EmulatorClient) -> bool {
        match key_bit(key) {
            Some(bit) => {
                self.mask |= bit;
                client.set_input_mask(self.mask);
                true
            }
            None => false,
        }
    }

    pub fn release(&mut self, key: u8, client: &mut impl EmulatorClient) -> bool {
        match key_bit(key) {
            Some(bit) => {
                self.mask &= !bit;
                client.set_input_mask(self.mask);
                true
            }
            None => false,
        }
    }

    /// let go of everything
    pub fn clear(&mut self, client: &mut impl EmulatorClient) {
        self.mask = 0;
        client.set_input_mask(self.mask);
    }

    /// hand the current mask to a client again, e.g. after it was reset
    pub fn push(&self, client: &mut impl EmulatorClient) {
        client.set_input_mask(self.mask);
    }
}

fn key_bit(key: u8) -> Option<u16> {
    if key <= 0x0f {
        Some(1 << key)
    } else {
        log::warn!("ignoring out-of-range key index 0x{:02x}", key);
        None
    }
}

/// Everything the host can ask of a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    KeyDown(u8),
    KeyUp(u8),
    TogglePause,
    Step,
    Reset,
    ToggleMute,
    Quit,
}

/// source of host events
pub trait KeySource {
    /// all events since the last poll, oldest first. must not block
    fn poll_events(&mut self) -> Result<Vec<HostEvent>, io::Error>;
}

/// Terminal raw mode, shared by everything that draws to or reads from the
/// terminal. The first live guard enters raw mode and the last one to drop
/// leaves it, so a renderer and a key reader can come and go independently.
pub struct RawMode(());

static RAW_MODE: Users = Users::new();

impl RawMode {
    pub fn acquire() -> Result<Self, io::Error> {
        RAW_MODE.enter(terminal::enable_raw_mode)?;
        Ok(RawMode(()))
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        RAW_MODE.leave(|| {
            if let Err(e) = terminal::disable_raw_mode() {
                log::error!("failed to leave raw mode: {}", e);
            }
        });
    }
}

/// count of holders of some process-wide state; `on` runs for the first,
/// `off` after the last
struct Users(Mutex<usize>);

impl Users {
    const fn new() -> Self {
        Users(Mutex::new(0))
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self, on: impl FnOnce() -> Result<(), io::Error>) -> Result<(), io::Error> {
        let mut users = self.lock();
        if *users == 0 {
            on()?;
        }
        *users += 1;
        Ok(())
    }

    fn leave(&self, off: impl FnOnce()) {
        let mut users = self.lock();
        *users = users.saturating_sub(1);
        if *users == 0 {
            off();
        }
    }
}

/// how long a key counts as held when the terminal can't tell us it was let go
const TERM_KEY_HOLD: Duration = Duration::from_millis(150);

/// reads keypresses from the terminal with crossterm.
///
/// Most terminals only ever report presses, so each press is held for a
/// short window and then released; key repeat keeps it held.
pub struct TermKeys {
    keymap: HashMap<char, u8>,
    held: HashMap<u8, Instant>,
    _raw: RawMode,
}

impl TermKeys {
    pub fn new() -> Result<Self, io::Error> {
        Self::with_keymap(&CHIP8_CONVENTIONAL_KEYMAP)
    }

    pub fn with_keymap(keymap: &[(char, u8)]) -> Result<Self, io::Error> {
        Ok(TermKeys {
            keymap: keymap.iter().copied().collect(),
            held: HashMap::new(),
            _raw: RawMode::acquire()?,
        })
    }

    fn translate(&mut self, evt: KeyEvent, now: Instant, out: &mut Vec<HostEvent>) {
        match evt.code {
            KeyCode::Char(c) => match self.keymap.get(&c.to_ascii_lowercase()) {
                Some(&key) => match evt.kind {
                    KeyEventKind::Release => {
                        if self.held.remove(&key).is_some() {
                            out.push(HostEvent::KeyUp(key));
                        }
                    }
                    _ => {
                        if self.held.insert(key, now).is_none() {
                            out.push(HostEvent::KeyDown(key));
                        }
                    }
                },
                None if evt.kind == KeyEventKind::Release => {}
                None => match c {
                    ' ' | 'p' => out.push(HostEvent::TogglePause),
                    'n' => out.push(HostEvent::Step),
                    'm' => out.push(HostEvent::ToggleMute),
                    'o' => out.push(HostEvent::Reset),
                    _ => log::debug!("can't map {:?} to a COSMAC key", c),
                },
            },
            KeyCode::Esc => out.push(HostEvent::Quit),
            _ => log::debug!("unknown key event received"),
        }
    }
}

impl KeySource for TermKeys {
    fn poll_events(&mut self) -> Result<Vec<HostEvent>, io::Error> {
        let now = Instant::now();
        let mut out = Vec::new();
        while poll(Duration::from_millis(0))? {
            match read()? {
                Event::Key(evt) => self.translate(evt, now, &mut out),
                _ => log::debug!("unknown event received"),
            }
        }
        let expired: Vec<u8> = self
            .held
            .iter()
            .filter(|(_, at)| now.duration_since(**at) >= TERM_KEY_HOLD)
            .map(|(key, _)| *key)
            .collect();
        for key in expired {
            self.held.remove(&key);
            out.push(HostEvent::KeyUp(key));
        }
        Ok(out)
    }
}

/// dummy KeySource implementation for testing; hands out one batch per poll
pub struct DummyKeys {
    batches: Vec<Vec<HostEvent>>,
}

impl DummyKeys {
    pub fn new(mut batches: Vec<Vec<HostEvent>>) -> Self {
        batches.reverse();
        DummyKeys { batches }
    }
}

impl KeySource for DummyKeys {
    fn poll_events(&mut self) -> Result<Vec<HostEvent>, io::Error> {
        Ok(self.batches.pop().unwrap_or_default())
    }
}
