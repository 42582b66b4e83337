use crate::engine::synth::{NoteSink, NoteTrigger};
use crate::engine::{AudioEngine, PartId, SynthId, SynthOptions, TransportState, VolumeId};
use crate::error::SoundtrackError;
use crate::fetch::Fetcher;
use crate::model::song::{Note, NoteEvent};
use anyhow::{Result, bail};
use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

pub const TEST_TICKS_PER_QUARTER: u16 = 480;

pub fn note(name: &str, time: f64, duration: f64, velocity: f64) -> Note {
    Note {
        midi: 60,
        name: name.to_string(),
        time,
        duration,
        velocity,
        ticks: 0,
        duration_ticks: 0,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NoteSpec {
    pub key: u8,
    pub start: u32,
    pub length: u32,
    pub velocity: u8,
}

impl NoteSpec {
    pub fn new(key: u8, start: u32, length: u32, velocity: u8) -> Self {
        Self {
            key,
            start,
            length,
            velocity,
        }
    }
}

/// Encodes a Standard MIDI File at 480 ticks per quarter. The tempo, if any, goes at tick 0
/// of the first track.
pub fn midi_bytes(mpqn: Option<u32>, tracks: &[&[NoteSpec]]) -> Vec<u8> {
    let format = if tracks.len() == 1 {
        Format::SingleTrack
    } else {
        Format::Parallel
    };
    let mut smf = Smf::new(Header::new(
        format,
        Timing::Metrical(u15::from(TEST_TICKS_PER_QUARTER)),
    ));

    for (idx, notes) in tracks.iter().enumerate() {
        // (tick, order, event): releases sort ahead of attacks on the same tick
        let mut timeline: Vec<(u32, u8, TrackEventKind<'static>)> = Vec::new();

        if idx == 0
            && let Some(mpqn) = mpqn
        {
            timeline.push((0, 0, TrackEventKind::Meta(MetaMessage::Tempo(u24::from(mpqn)))));
        }

        for spec in notes.iter() {
            timeline.push((
                spec.start,
                2,
                TrackEventKind::Midi {
                    channel: u4::from(idx as u8),
                    message: MidiMessage::NoteOn {
                        key: u7::from(spec.key),
                        vel: u7::from(spec.velocity),
                    },
                },
            ));
            timeline.push((
                spec.start + spec.length,
                1,
                TrackEventKind::Midi {
                    channel: u4::from(idx as u8),
                    message: MidiMessage::NoteOff {
                        key: u7::from(spec.key),
                        vel: u7::from(0),
                    },
                },
            ));
        }

        timeline.sort_by_key(|(tick, order, _)| (*tick, *order));

        let mut track: Vec<TrackEvent<'static>> = Vec::new();
        let mut last_tick = 0;
        for (tick, _, kind) in timeline.into_iter() {
            track.push(TrackEvent {
                delta: u28::from(tick - last_tick),
                kind,
            });
            last_tick = tick;
        }
        track.push(TrackEvent {
            delta: u28::from(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        smf.tracks.push(track);
    }

    let mut bytes = Vec::new();
    smf.write(&mut bytes).unwrap();
    bytes
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    triggers: Mutex<Vec<NoteTrigger>>,
}

impl RecordingSink {
    pub fn triggers(&self) -> Vec<NoteTrigger> {
        self.triggers.lock().unwrap().clone()
    }
}

impl NoteSink for RecordingSink {
    fn trigger_attack_release(&self, trigger: &NoteTrigger) {
        self.triggers.lock().unwrap().push(trigger.clone());
    }
}

/// Serves fixed payloads by URL.
pub struct MapFetcher {
    payloads: HashMap<String, Vec<u8>>,
}

impl MapFetcher {
    pub fn new(payloads: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
        Self {
            payloads: payloads.into_iter().collect(),
        }
    }
}

impl Fetcher for MapFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        match self.payloads.get(url) {
            Some(bytes) => Ok(bytes.clone()),
            None => bail!(SoundtrackError::Fetch {
                url: url.to_string(),
                reason: String::from("404 Not Found"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    StartContext,
    CreateVolume(f64),
    SetVolume(VolumeId, f64),
    DisposeVolume(VolumeId),
    CreateSynth(SynthOptions),
    DisposeSynth(SynthId),
    /// Part id and number of events bound to it.
    CreatePart(PartId, usize),
    DisposePart(PartId),
    TransportStart,
    TransportStop,
    TransportCancel,
    SetPosition(f64),
    SetBpm(f64),
}

#[derive(Debug)]
struct MockTransport {
    started: bool,
    position: f64,
    bpm: f64,
}

#[derive(Debug)]
struct MockPart {
    id: PartId,
    events: Vec<NoteEvent>,
    scheduled: bool,
}

/// [`AudioEngine`] that records every call and keeps a manually advanced transport.
#[derive(Debug)]
pub struct MockEngine {
    calls: Mutex<Vec<EngineCall>>,
    parts: Mutex<Vec<MockPart>>,
    transport: Mutex<MockTransport>,
    next_id: AtomicU64,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            parts: Mutex::new(Vec::new()),
            transport: Mutex::new(MockTransport {
                started: false,
                position: 0.0,
                bpm: 120.0,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    fn record(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|call| predicate(call)).count()
    }

    /// Events that would still fire if the transport ran to the end.
    pub fn live_events(&self) -> Vec<NoteEvent> {
        self.parts
            .lock()
            .unwrap()
            .iter()
            .filter(|part| part.scheduled)
            .flat_map(|part| part.events.iter().cloned())
            .collect()
    }

    pub fn advance(&self, seconds: f64) {
        let mut transport = self.transport.lock().unwrap();
        if transport.started {
            transport.position += seconds;
        }
    }
}

impl AudioEngine for MockEngine {
    fn start_context(&self) -> Result<()> {
        self.record(EngineCall::StartContext);
        Ok(())
    }

    fn create_volume(&self, db: f64) -> Result<VolumeId> {
        self.record(EngineCall::CreateVolume(db));
        Ok(VolumeId(self.next_id()))
    }

    fn set_volume_db(&self, volume: VolumeId, db: f64) -> Result<()> {
        self.record(EngineCall::SetVolume(volume, db));
        Ok(())
    }

    fn dispose_volume(&self, volume: VolumeId) -> Result<()> {
        self.record(EngineCall::DisposeVolume(volume));
        Ok(())
    }

    fn create_synth(&self, options: SynthOptions, _output: VolumeId) -> Result<SynthId> {
        self.record(EngineCall::CreateSynth(options));
        Ok(SynthId(self.next_id()))
    }

    fn dispose_synth(&self, synth: SynthId) -> Result<()> {
        self.record(EngineCall::DisposeSynth(synth));
        Ok(())
    }

    fn create_part(&self, _synth: SynthId, events: Vec<NoteEvent>, _start: f64) -> Result<PartId> {
        let id = PartId(self.next_id());
        self.record(EngineCall::CreatePart(id, events.len()));
        self.parts.lock().unwrap().push(MockPart {
            id,
            events,
            scheduled: true,
        });
        Ok(id)
    }

    fn dispose_part(&self, part: PartId) -> Result<()> {
        self.record(EngineCall::DisposePart(part));
        self.parts.lock().unwrap().retain(|p| p.id != part);
        Ok(())
    }

    fn transport_start(&self) -> Result<()> {
        self.record(EngineCall::TransportStart);
        self.transport.lock().unwrap().started = true;
        Ok(())
    }

    fn transport_stop(&self) -> Result<()> {
        self.record(EngineCall::TransportStop);
        let mut transport = self.transport.lock().unwrap();
        transport.started = false;
        transport.position = 0.0;
        Ok(())
    }

    fn transport_cancel(&self) -> Result<()> {
        self.record(EngineCall::TransportCancel);
        self.parts
            .lock()
            .unwrap()
            .iter_mut()
            .for_each(|part| part.scheduled = false);
        Ok(())
    }

    fn set_transport_position(&self, seconds: f64) -> Result<()> {
        self.record(EngineCall::SetPosition(seconds));
        self.transport.lock().unwrap().position = seconds;
        Ok(())
    }

    fn transport_position(&self) -> f64 {
        self.transport.lock().unwrap().position
    }

    fn transport_state(&self) -> TransportState {
        if self.transport.lock().unwrap().started {
            TransportState::Started
        } else {
            TransportState::Stopped
        }
    }

    fn set_bpm(&self, bpm: f64) {
        self.record(EngineCall::SetBpm(bpm));
        self.transport.lock().unwrap().bpm = bpm;
    }

    fn bpm(&self) -> f64 {
        self.transport.lock().unwrap().bpm
    }
}
