use crate::engine::{SynthOptions, VolumeId};
use log::{debug, info, warn};

/// A note handed to the output once the synth has a free voice for it.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteTrigger {
    pub name: String,
    /// Transport time in seconds.
    pub time: f64,
    pub duration: f64,
    pub velocity: f64,
    /// Level of the volume node the synth is routed through.
    pub gain_db: f64,
}

/// Receives note triggers from the engine's synths.
pub trait NoteSink: Send + Sync {
    fn trigger_attack_release(&self, trigger: &NoteTrigger);
}

/// [`NoteSink`] that writes every trigger to the log.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    verbose: bool,
}

impl LogSink {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl NoteSink for LogSink {
    fn trigger_attack_release(&self, trigger: &NoteTrigger) {
        let line = format!(
            "{:6} | at {:>10.3}s | duration: {:>8.3}s | velocity: {:.3} | gain: {:.2}dB",
            trigger.name, trigger.time, trigger.duration, trigger.velocity, trigger.gain_db
        );

        if self.verbose {
            info!("{}", line);
        } else {
            debug!("{}", line);
        }
    }
}

/// Voice bookkeeping for a polyphonic synth.
#[derive(Debug, Clone)]
pub struct PolySynth {
    max_polyphony: usize,
    output: VolumeId,
    /// Release times of the voices currently sounding.
    voices: Vec<f64>,
    dropped: usize,
}

impl PolySynth {
    pub fn new(options: SynthOptions, output: VolumeId) -> Self {
        Self {
            max_polyphony: options.max_polyphony.max(1),
            output,
            voices: Vec::with_capacity(options.max_polyphony),
            dropped: 0,
        }
    }

    pub fn output(&self) -> VolumeId {
        self.output
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Claims a voice for a note sounding from `time` for `duration` seconds.
    /// Returns `false` when every voice is busy and the note has to be dropped.
    pub fn allocate(&mut self, time: f64, duration: f64) -> bool {
        self.voices.retain(|release| *release > time);

        if self.voices.len() >= self.max_polyphony {
            self.dropped += 1;
            warn!(
                "Max polyphony of {} exceeded at {:.3}s, note dropped..!",
                self.max_polyphony, time
            );
            return false;
        }

        self.voices.push(time + duration);
        true
    }

    /// Frees every voice, e.g. when the transport is rewound.
    pub fn release_all(&mut self) {
        self.voices.clear();
    }
}
