use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Note {
    pub midi: u8,
    /// Scientific pitch name, e.g. `C4` or `F#3`.
    pub name: String,
    /// Start time in seconds from the beginning of the song.
    pub time: f64,
    /// Length in seconds.
    pub duration: f64,
    /// Normalized to `0.0..=1.0`.
    pub velocity: f64,
    pub ticks: u64,
    pub duration_ticks: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Tempo {
    pub bpm: f64,
    pub ticks: u64,
    pub time: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub name: Option<String>,
    pub channel: Option<u8>,
    pub notes: Vec<Note>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub ticks_per_quarter: u16,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Song {
    pub metadata: Metadata,
    /// Every tempo change in the file, ordered by tick.
    pub tempos: Vec<Tempo>,
    pub tracks: Vec<Track>,
}

impl Song {
    /// The bpm of the first tempo event, if the file carries one.
    pub fn first_tempo_bpm(&self) -> Option<f64> {
        self.tempos.first().map(|tempo| tempo.bpm)
    }

    /// End time of the last sounding note, in seconds.
    pub fn duration(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|track| track.notes.iter())
            .map(|note| note.time + note.duration)
            .fold(0.0, f64::max)
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|track| track.notes.len()).sum()
    }
}

/// A single schedulable note, as consumed by an engine part.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NoteEvent {
    pub time: f64,
    pub name: String,
    pub duration: f64,
    pub velocity: f64,
}

impl From<&Note> for NoteEvent {
    fn from(note: &Note) -> Self {
        Self {
            time: note.time,
            name: note.name.clone(),
            duration: note.duration,
            velocity: note.velocity,
        }
    }
}
