use crate::model::song::{NoteEvent, Song};

/// Flattens every note of every track into one schedulable list.
///
/// Events come out in track order, then in note order within each track. No global time sort
/// is applied: each event carries its own absolute time and engines schedule by timestamp.
pub fn translate(song: &Song) -> Vec<NoteEvent> {
    song.tracks
        .iter()
        .flat_map(|track| track.notes.iter())
        .map(NoteEvent::from)
        .collect()
}
