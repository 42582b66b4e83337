use crate::error::SoundtrackError;
use crate::model::song::*;
use crate::util::midi_note_name;
use anyhow::{Result, bail};
use log::{debug, warn};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::HashMap;

const DEFAULT_MPQN: u32 = 500_000;
const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;
const MAX_VELOCITY: f64 = 127.0;

/// Decodes raw Standard MIDI File bytes into a [`Song`].
pub trait MidiParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<Song>;
}

/// [`MidiParser`] backed by `midly`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MidlyParser;

impl MidiParser for MidlyParser {
    fn parse(&self, bytes: &[u8]) -> Result<Song> {
        midi_bytes_to_song(bytes)
    }
}

struct NoteInterval {
    pub midi: u8,
    pub start_tick: u64,
    pub end_tick: u64,
    pub velocity: u8,
}

#[derive(Debug, Clone)]
struct TempoSegment {
    pub mpqn: u32,
    pub start_tick: u64,
    pub seconds_at_start: f64,
}

/// Maps absolute ticks to seconds across every tempo change in the file.
struct TempoMap {
    ticks_per_quarter: u64,
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    fn new(ticks_per_quarter: u64, mut tempo_changes: Vec<(u64, u32)>) -> Self {
        tempo_changes.sort_by_key(|(tick, _)| *tick);

        let mut segments = vec![TempoSegment {
            mpqn: DEFAULT_MPQN,
            start_tick: 0,
            seconds_at_start: 0.0,
        }];

        for (tick, mpqn) in tempo_changes.into_iter() {
            let Some(last) = segments.last() else {
                continue;
            };

            let seconds_at_start = last.seconds_at_start
                + Self::span_seconds(tick - last.start_tick, last.mpqn, ticks_per_quarter);

            // a change on the same tick replaces the previous one
            if tick == last.start_tick {
                segments.pop();
            }

            segments.push(TempoSegment {
                mpqn,
                start_tick: tick,
                seconds_at_start,
            });
        }

        Self {
            ticks_per_quarter,
            segments,
        }
    }

    fn span_seconds(ticks: u64, mpqn: u32, ticks_per_quarter: u64) -> f64 {
        (ticks as f64) * (mpqn as f64) / (ticks_per_quarter as f64) / 1_000_000.0
    }

    fn ticks_to_seconds(&self, tick: u64) -> f64 {
        let segment = match self.segments.iter().rfind(|seg| seg.start_tick <= tick) {
            Some(s) => s,
            None => &self.segments[0],
        };

        segment.seconds_at_start
            + Self::span_seconds(tick - segment.start_tick, segment.mpqn, self.ticks_per_quarter)
    }
}

pub fn midi_bytes_to_song(bytes: &[u8]) -> Result<Song> {
    let smf = match Smf::parse(bytes) {
        Ok(smf) => smf,
        Err(e) => bail!(SoundtrackError::Parse(e.to_string())),
    };

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(t) if t.as_int() > 0 => t.as_int(),
        Timing::Metrical(_) => {
            bail!(SoundtrackError::Parse(String::from(
                "header declares zero ticks per quarter note"
            )));
        }
        Timing::Timecode(_fps, _subframe) => {
            bail!(SoundtrackError::Parse(String::from(
                "SMPTE timecode midi timing is not currently supported"
            )));
        }
    };

    debug!("Ticks per quarter note: {}", ticks_per_quarter);
    debug!(
        "MIDI format: {:?}, tracks: {}",
        smf.header.format,
        smf.tracks.len()
    );

    let mut tempo_changes: Vec<(u64, u32)> = Vec::new();
    let mut track_intervals: Vec<Vec<NoteInterval>> = Vec::with_capacity(smf.tracks.len());
    let mut tracks: Vec<Track> = Vec::with_capacity(smf.tracks.len());

    for (track_idx, midi_track) in smf.tracks.iter().enumerate() {
        let mut abs_tick: u64 = 0;
        let mut track = Track::default();
        let mut intervals: Vec<NoteInterval> = Vec::new();
        let mut open_notes: HashMap<(u8, u8), Vec<(u64, u8)>> = HashMap::new();

        for event in midi_track.iter() {
            abs_tick = abs_tick.saturating_add(event.delta.as_int() as u64);

            match &event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(micro)) => {
                    let mpqn: u32 = micro.as_int();
                    if mpqn == 0 {
                        warn!("Ignoring zero tempo at tick {} (track {})..!", abs_tick, track_idx);
                        continue;
                    }
                    tempo_changes.push((abs_tick, mpqn));
                    debug!(
                        "Tempo change at tick {} -> {} us/qn (track {})",
                        abs_tick, mpqn, track_idx
                    );
                }
                TrackEventKind::Meta(MetaMessage::TrackName(bytes)) => {
                    if track.name.is_none() {
                        let name = String::from_utf8_lossy(bytes).trim().to_string();
                        debug!("Track {} name: {}", track_idx, name);
                        track.name = Some(name);
                    }
                }
                TrackEventKind::Midi { channel, message } => {
                    let ch: u8 = channel.as_int();
                    track.channel.get_or_insert(ch);

                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            open_notes
                                .entry((ch, key.as_int()))
                                .or_default()
                                .push((abs_tick, vel.as_int()));
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            close_note(&mut open_notes, &mut intervals, ch, key.as_int(), abs_tick);
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        // notes never released end where the track ends
        for ((ch, key), stack) in open_notes.into_iter() {
            for (start_tick, velocity) in stack {
                let end_tick = abs_tick.max(start_tick + ticks_per_quarter as u64);
                warn!(
                    "Unclosed NoteOn for {}, channel: {} at tick: {} auto-closing at: {}..!",
                    key, ch, start_tick, end_tick
                );
                intervals.push(NoteInterval {
                    midi: key,
                    start_tick,
                    end_tick,
                    velocity,
                });
            }
        }

        intervals.sort_by_key(|interval| interval.start_tick);
        track_intervals.push(intervals);
        tracks.push(track);
    }

    let tempo_map = TempoMap::new(ticks_per_quarter as u64, tempo_changes.clone());

    for (track, intervals) in tracks.iter_mut().zip(track_intervals.into_iter()) {
        track.notes = intervals
            .into_iter()
            .map(|interval| {
                let time = tempo_map.ticks_to_seconds(interval.start_tick);
                let end = tempo_map.ticks_to_seconds(interval.end_tick);

                Note {
                    midi: interval.midi,
                    name: midi_note_name(interval.midi),
                    time,
                    duration: end - time,
                    velocity: interval.velocity as f64 / MAX_VELOCITY,
                    ticks: interval.start_tick,
                    duration_ticks: interval.end_tick - interval.start_tick,
                }
            })
            .collect();
    }

    tempo_changes.sort_by_key(|(tick, _)| *tick);
    let tempos = tempo_changes
        .into_iter()
        .map(|(ticks, mpqn)| Tempo {
            bpm: MICROSECONDS_PER_MINUTE / (mpqn as f64),
            ticks,
            time: tempo_map.ticks_to_seconds(ticks),
        })
        .collect();

    let title = tracks
        .iter()
        .filter_map(|track| track.name.clone())
        .find(|name| !name.is_empty());

    Ok(Song {
        metadata: Metadata {
            title,
            ticks_per_quarter,
        },
        tempos,
        tracks,
    })
}

fn close_note(
    open_notes: &mut HashMap<(u8, u8), Vec<(u64, u8)>>,
    intervals: &mut Vec<NoteInterval>,
    ch: u8,
    midi_num: u8,
    abs_tick: u64,
) {
    // earliest unreleased NoteOn of this pitch is released first
    let opened = open_notes
        .get_mut(&(ch, midi_num))
        .filter(|stack| !stack.is_empty())
        .map(|stack| stack.remove(0));

    if let Some((start_tick, velocity)) = opened {
        intervals.push(NoteInterval {
            midi: midi_num,
            start_tick,
            end_tick: abs_tick,
            velocity,
        });
    } else {
        debug!(
            "Orphaned NoteOff for {} ch{} at tick {}..!",
            midi_num, ch, abs_tick
        );
    }
}
