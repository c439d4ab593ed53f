use beep::beep;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SoundError {
    #[error("tone device failed: {0}")]
    Device(String),
}

/// a continuous tone that is either on or off; no envelope, just like the
/// buzzer on the real thing
pub trait Sound {
    fn beep(&mut self) -> Result<(), SoundError>;
    fn stop(&mut self) -> Result<(), SoundError>;
}

const SIMPLEBEEP_PITCH: u16 = 2093; // C

/// PC speaker tone via the beep crate
pub struct SimpleBeep {
    is_beeping: bool,
}

impl SimpleBeep {
    pub fn new() -> Self {
        SimpleBeep { is_beeping: false }
    }

    /// factory for [`AudioGate::new`]
    pub fn open() -> Result<Self, SoundError> {
        Ok(SimpleBeep::new())
    }
}

impl Default for SimpleBeep {
    fn default() -> Self {
        SimpleBeep::new()
    }
}

impl Sound for SimpleBeep {
    fn beep(&mut self) -> Result<(), SoundError> {
        beep(SIMPLEBEEP_PITCH).map_err(|e| SoundError::Device(e.to_string()))?;
        self.is_beeping = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SoundError> {
        beep(0).map_err(|e| SoundError::Device(e.to_string()))?;
        self.is_beeping = false;
        Ok(())
    }
}

impl Drop for SimpleBeep {
    fn drop(&mut self) {
        if self.is_beeping {
            let _ = beep(0);
        }
    }
}

pub struct Mute {}
impl Mute {
    pub fn new() -> Self {
        Mute {}
    }

    pub fn open() -> Result<Self, SoundError> {
        Ok(Mute::new())
    }
}
impl Default for Mute {
    fn default() -> Self {
        Mute::new()
    }
}
impl Sound for Mute {
    fn beep(&mut self) -> Result<(), SoundError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SoundError> {
        Ok(())
    }
}

/// Turns "should the buzzer sound" into tone on/off commands.
///
/// The device is opened the first time the gate is updated or unmuted and
/// dropped on [`AudioGate::teardown`]. Commands only go out on transitions.
/// While muted the tone is held off whatever the sound timer says.
pub struct AudioGate<S: Sound> {
    open: Box<dyn FnMut() -> Result<S, SoundError>>,
    device: Option<S>,
    muted: bool,
    /// last thing asked of us, before muting is applied
    requested: bool,
    /// what the device is actually doing
    sounding: bool,
}

impl<S: Sound> AudioGate<S> {
    pub fn new(open: impl FnMut() -> Result<S, SoundError> + 'static) -> Self {
        AudioGate {
            open: Box::new(open),
            device: None,
            muted: false,
            requested: false,
            sounding: false,
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_sounding(&self) -> bool {
        self.sounding
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// feed the latest sound state (running and sound timer non-zero)
    pub fn update(&mut self, should_sound: bool) -> Result<(), SoundError> {
        self.requested = should_sound;
        self.apply()
    }

    pub fn set_muted(&mut self, muted: bool) -> Result<(), SoundError> {
        self.muted = muted;
        if muted {
            log::info!("audio muted");
        } else {
            log::info!("audio unmuted");
        }
        self.apply()
    }

    pub fn toggle_mute(&mut self) -> Result<(), SoundError> {
        self.set_muted(!self.muted)
    }

    /// silence and release the device; the next update opens a fresh one
    pub fn teardown(&mut self) -> Result<(), SoundError> {
        self.requested = false;
        if let Some(mut device) = self.device.take() {
            if self.sounding {
                device.stop()?;
            }
        }
        self.sounding = false;
        Ok(())
    }

    fn apply(&mut self) -> Result<(), SoundError> {
        let want = !self.muted && self.requested;
        if self.device.is_none() {
            if self.muted {
                // nothing to silence and no reason to open anything yet
                return Ok(());
            }
            log::debug!("opening tone device");
            self.device = Some((self.open)()?);
        }
        let device = match self.device.as_mut() {
            Some(d) => d,
            None => return Ok(()),
        };
        if want != self.sounding {
            if want {
                device.beep()?;
            } else {
                device.stop()?;
            }
            self.sounding = want;
        }
        Ok(())
    }
}
