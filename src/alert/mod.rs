#[cfg(feature = "sound")]
mod chime;
#[cfg(feature = "sound")]
mod engine;

use std::io::Write;

#[cfg(feature = "sound")]
pub use engine::SoundAlert;

/// Audible notification for a watchlist hit. Must not block the caller.
pub trait Alerter: Send + Sync {
    fn alert(&self, plate: &str);
}

/// Rings the terminal bell on stderr.
pub struct TerminalBell;

impl Alerter for TerminalBell {
    fn alert(&self, plate: &str) {
        let mut stderr = std::io::stderr();
        if let Err(err) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
            log::debug!("Terminal bell failed for {plate}: {err}");
        }
    }
}

/// No sound at all (`alert.sound_enabled = false`).
pub struct MutedAlert;

impl Alerter for MutedAlert {
    fn alert(&self, _plate: &str) {}
}

/// Best available alerter for this build and configuration.
pub fn default_alerter(sound_enabled: bool) -> Box<dyn Alerter> {
    if !sound_enabled {
        return Box::new(MutedAlert);
    }

    #[cfg(feature = "sound")]
    let alerter: Box<dyn Alerter> = Box::new(SoundAlert::new());
    #[cfg(not(feature = "sound"))]
    let alerter: Box<dyn Alerter> = Box::new(TerminalBell);

    alerter
}
