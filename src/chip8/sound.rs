use log::info;

/// Receives one pulse each time the sound timer runs out.
pub trait SoundSink {
    fn pulse(&mut self);
}

/// Default sink: the beep only shows up in the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl SoundSink for LogSink {
    fn pulse(&mut self) {
        info!("Beep!");
    }
}
