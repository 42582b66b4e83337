use crate::model::song::NoteEvent;
use anyhow::Result;

pub mod software;
pub mod synth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SynthId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthOptions {
    pub max_polyphony: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Started,
    Stopped,
}

/// Synthesis and transport capabilities the player drives.
///
/// Nodes and parts are addressed by handles the engine hands out. Transport times are in
/// seconds.
pub trait AudioEngine: Send + Sync {
    /// Resumes the audio context. Called once before any node is created.
    fn start_context(&self) -> Result<()>;

    fn create_volume(&self, db: f64) -> Result<VolumeId>;

    fn set_volume_db(&self, volume: VolumeId, db: f64) -> Result<()>;

    fn dispose_volume(&self, volume: VolumeId) -> Result<()>;

    /// Creates a polyphonic synth whose output is routed through `output`.
    fn create_synth(&self, options: SynthOptions, output: VolumeId) -> Result<SynthId>;

    fn dispose_synth(&self, synth: SynthId) -> Result<()>;

    /// Binds `events` to the transport timeline, offset by `start` seconds, played on `synth`.
    fn create_part(&self, synth: SynthId, events: Vec<NoteEvent>, start: f64) -> Result<PartId>;

    /// Unschedules and forgets a part. Its events must never fire afterwards.
    fn dispose_part(&self, part: PartId) -> Result<()>;

    fn transport_start(&self) -> Result<()>;

    /// Halts the transport and rewinds it to zero.
    fn transport_stop(&self) -> Result<()>;

    /// Clears every event scheduled on the transport timeline.
    fn transport_cancel(&self) -> Result<()>;

    fn set_transport_position(&self, seconds: f64) -> Result<()>;

    fn transport_position(&self) -> f64;

    fn transport_state(&self) -> TransportState;

    fn set_bpm(&self, bpm: f64);

    fn bpm(&self) -> f64;

    fn reset_transport(&self) -> Result<()> {
        self.transport_stop()?;
        self.transport_cancel()
    }
}
