use rodio::{OutputStream, Sink};
use std::sync::{
    mpsc::{self, Sender},
    Mutex,
};
use std::thread;

use super::{chime::MatchChime, Alerter};

enum AlertCommand {
    Chime,
}

/// Plays the match chime on a dedicated thread that owns the (non-`Send`)
/// audio output. The thread starts lazily on the first alert.
pub struct SoundAlert {
    tx: Mutex<Option<Sender<AlertCommand>>>,
}

impl SoundAlert {
    pub fn new() -> Self {
        Self {
            tx: Mutex::new(None),
        }
    }

    fn ensure_thread(&self) -> Result<Sender<AlertCommand>, String> {
        let mut guard = self.tx.lock().map_err(|e| e.to_string())?;
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AlertCommand>();

        thread::Builder::new()
            .name("alert-audio".to_string())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(e) => {
                        log::warn!("No audio output for match alerts: {e}");
                        return;
                    }
                };
                let sink = match Sink::try_new(&handle) {
                    Ok(sink) => sink,
                    Err(e) => {
                        log::warn!("Failed to create alert sink: {e}");
                        return;
                    }
                };

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AlertCommand::Chime => {
                            // Overlapping matches restart the chime rather than queue.
                            sink.clear();
                            sink.append(MatchChime::new());
                            sink.play();
                        }
                    }
                }
            })
            .map_err(|e| e.to_string())?;

        *guard = Some(tx.clone());
        Ok(tx)
    }
}

impl Alerter for SoundAlert {
    fn alert(&self, plate: &str) {
        let sent = self
            .ensure_thread()
            .and_then(|tx| tx.send(AlertCommand::Chime).map_err(|e| e.to_string()));
        if let Err(err) = sent {
            log::warn!("Match alert for {plate} could not be played: {err}");
        }
    }
}
