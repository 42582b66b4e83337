mod engine;
mod error;
mod extension;
mod fetch;
mod loader;
mod midi_importer;
mod model;
mod player;
mod translator;
mod util;

#[cfg(test)]
mod test_helpers;

pub use engine::software::SoftwareEngine;
pub use engine::synth::{LogSink, NoteSink, NoteTrigger, PolySynth};
pub use engine::*;
pub use error::*;
pub use extension::*;
pub use fetch::*;
pub use loader::*;
pub use midi_importer::*;
pub use model::config::*;
pub use model::song::*;
pub use player::*;
pub use translator::*;
pub use util::*;
