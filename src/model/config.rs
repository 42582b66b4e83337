use clap::Parser;
use serde::{Deserialize, Serialize};

/// Polyphony cap used by the bundled synth unless overridden.
pub const DEFAULT_MAX_POLYPHONY: usize = 16;
pub const DEFAULT_VOLUME_PERCENT: f64 = 100.0;
pub const DEFAULT_MAX_FETCH_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(
    name = "midi_soundtrack",
    about = "Load a MIDI file from a URL or path and play it through a synthesizer!"
)]
pub struct Args {
    /// URL (http, https, file) or local path of the target MIDI file.
    #[arg(required_unless_present = "describe")]
    pub source: Option<String>,

    /// Playback volume in percent. Values outside 0..=100 are clamped.
    #[arg(long, default_value_t = DEFAULT_VOLUME_PERCENT, allow_negative_numbers = true)]
    pub volume: f64,

    /// Maximum number of simultaneously sounding voices.
    #[arg(long = "max-polyphony", default_value_t = DEFAULT_MAX_POLYPHONY)]
    pub max_polyphony: usize,

    /// Dry run (print first dry_run_max events and exit).
    #[arg(short, long, default_value_t = false)]
    pub dry_run: bool,

    /// Maximum events to print in dry run.
    #[arg(long, default_value_t = 80)]
    pub dry_run_max: usize,

    /// Logs every note trigger.
    #[arg(short, long)]
    pub verbose: bool,

    /// Delays the start of playback by N seconds after loading.
    #[arg(long = "delay-start", default_value_t = 0)]
    pub delay_start: u64,

    /// Print the extension's block description as JSON and exit.
    #[arg(long, default_value_t = false)]
    pub describe: bool,
}

/// Options for a playback controller and its bundled collaborators.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SoundtrackConfig {
    pub max_polyphony: usize,
    /// Level the volume node is created at, before any `set_volume`.
    pub initial_volume_db: f64,
    pub max_fetch_bytes: u64,
}

impl Default for SoundtrackConfig {
    fn default() -> Self {
        Self {
            max_polyphony: DEFAULT_MAX_POLYPHONY,
            initial_volume_db: 0.0,
            max_fetch_bytes: DEFAULT_MAX_FETCH_BYTES,
        }
    }
}

impl From<&Args> for SoundtrackConfig {
    fn from(args: &Args) -> Self {
        Self {
            max_polyphony: args.max_polyphony.max(1),
            ..Default::default()
        }
    }
}
