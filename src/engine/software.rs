use crate::engine::synth::{NoteSink, NoteTrigger, PolySynth};
use crate::engine::{AudioEngine, PartId, SynthId, SynthOptions, TransportState, VolumeId};
use crate::error::SoundtrackError;
use crate::model::song::NoteEvent;
use anyhow::{Result, bail};
use log::{debug, info, warn};
use spin_sleep::{SpinSleeper, SpinStrategy};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const DEFAULT_BPM: f64 = 120.0;
const MAX_SLEEP_CHUNK_S: f64 = 0.050;

enum ControlMsg {
    Stop,
}

#[derive(Debug)]
struct Part {
    synth: SynthId,
    events: Vec<NoteEvent>,
    start: f64,
    scheduled: bool,
}

#[derive(Debug, Default)]
struct Graph {
    volumes: HashMap<VolumeId, f64>,
    synths: HashMap<SynthId, PolySynth>,
    parts: HashMap<PartId, Part>,
}

impl Graph {
    /// Every scheduled event at or after `from`, ordered by transport time.
    fn timeline(&self, from: f64) -> Vec<(f64, PartId, NoteEvent)> {
        let mut timeline: Vec<(f64, PartId, NoteEvent)> = self
            .parts
            .iter()
            .filter(|(_, part)| part.scheduled)
            .flat_map(|(id, part)| {
                part.events
                    .iter()
                    .map(move |event| (part.start + event.time, *id, event.clone()))
            })
            .filter(|(at, _, _)| *at >= from)
            .collect();

        timeline.sort_by(|a, b| a.0.total_cmp(&b.0));
        timeline
    }

    /// Resolves a due event to a trigger, or `None` if its part is gone or the synth is full.
    fn trigger_for(&mut self, part_id: PartId, event: &NoteEvent, at: f64) -> Option<NoteTrigger> {
        let part = self.parts.get(&part_id).filter(|part| part.scheduled)?;
        let synth = self.synths.get_mut(&part.synth)?;
        let gain_db = self.volumes.get(&synth.output()).copied().unwrap_or(0.0);

        if !synth.allocate(at, event.duration) {
            return None;
        }

        Some(NoteTrigger {
            name: event.name.clone(),
            time: at,
            duration: event.duration,
            velocity: event.velocity,
            gain_db,
        })
    }
}

#[derive(Debug)]
struct Transport {
    bpm: f64,
    offset: f64,
    started_at: Option<Instant>,
    control_tx: Option<Sender<ControlMsg>>,
    worker_handle: Option<JoinHandle<()>>,
}

impl Transport {
    fn position(&self) -> f64 {
        match self.started_at {
            Some(started_at) => self.offset + started_at.elapsed().as_secs_f64(),
            None => self.offset,
        }
    }
}

/// [`AudioEngine`] that keeps its node graph in memory and runs the transport on a worker
/// thread, handing due notes to a [`NoteSink`].
pub struct SoftwareEngine<S: NoteSink> {
    sink: Arc<S>,
    graph: Arc<Mutex<Graph>>,
    transport: Mutex<Transport>,
    next_id: AtomicU64,
    context_started: AtomicBool,
}

impl<S: NoteSink + 'static> SoftwareEngine<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink: Arc::new(sink),
            graph: Arc::new(Mutex::new(Graph::default())),
            transport: Mutex::new(Transport {
                bpm: DEFAULT_BPM,
                offset: 0.0,
                started_at: None,
                control_tx: None,
                worker_handle: None,
            }),
            next_id: AtomicU64::new(1),
            context_started: AtomicBool::new(false),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Notes dropped by every synth because all of its voices were busy.
    pub fn dropped_notes(&self) -> usize {
        self.graph
            .lock()
            .map(|graph| graph.synths.values().map(PolySynth::dropped).sum())
            .unwrap_or(0)
    }

    fn with_graph<T>(&self, f: impl FnOnce(&mut Graph) -> Result<T>) -> Result<T> {
        let Ok(mut graph) = self.graph.lock() else {
            bail!(SoundtrackError::Engine(String::from("Failed to lock the node graph..!")));
        };

        f(&mut graph)
    }

    fn spawn_worker(&self, transport: &mut Transport) -> Result<()> {
        let offset = transport.offset;
        let timeline = self.with_graph(|graph| {
            graph.synths.values_mut().for_each(PolySynth::release_all);
            Ok(graph.timeline(offset))
        })?;

        debug!(
            "Starting transport at {:.3}s with {} scheduled events..!",
            offset,
            timeline.len()
        );

        let graph = Arc::clone(&self.graph);
        let sink = Arc::clone(&self.sink);
        let (tx, rx) = mpsc::channel::<ControlMsg>();
        let start = Instant::now();

        let handle = thread::spawn(move || {
            let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);

            for (at, part_id, event) in timeline.into_iter() {
                let due = at - offset;

                loop {
                    if rx.try_recv().is_ok() {
                        debug!("Transport worker stopped via control message..!");
                        return;
                    }

                    let remaining = due - start.elapsed().as_secs_f64();
                    if remaining <= 0.0 {
                        break;
                    }

                    sleeper.sleep(Duration::from_secs_f64(remaining.min(MAX_SLEEP_CHUNK_S)));
                }

                let trigger = match graph.lock() {
                    Ok(mut graph) => graph.trigger_for(part_id, &event, at),
                    Err(_) => {
                        warn!("Node graph poisoned, transport worker exiting..!");
                        return;
                    }
                };

                if let Some(trigger) = trigger {
                    sink.trigger_attack_release(&trigger);
                }
            }

            debug!("Transport worker fired all scheduled events..!");
        });

        transport.control_tx = Some(tx);
        transport.worker_handle = Some(handle);
        transport.started_at = Some(start);

        Ok(())
    }

    fn halt_worker(transport: &mut Transport) {
        if let Some(tx) = transport.control_tx.take() {
            let _ = tx.send(ControlMsg::Stop);
        }

        if let Some(handle) = transport.worker_handle.take()
            && handle.join().is_err()
        {
            warn!("Transport worker panicked..!");
        }
    }

    fn lock_transport(&self) -> Result<std::sync::MutexGuard<'_, Transport>> {
        let Ok(transport) = self.transport.lock() else {
            bail!(SoundtrackError::Engine(String::from("Failed to lock the transport..!")));
        };

        Ok(transport)
    }

    /// Rebuilds the worker's timeline from the current position if the transport is running.
    fn reschedule(&self) -> Result<()> {
        let mut transport = self.lock_transport()?;

        if transport.started_at.is_some() {
            transport.offset = transport.position();
            Self::halt_worker(&mut transport);
            self.spawn_worker(&mut transport)?;
        }

        Ok(())
    }
}

impl<S: NoteSink + 'static> AudioEngine for SoftwareEngine<S> {
    fn start_context(&self) -> Result<()> {
        if !self.context_started.swap(true, Ordering::SeqCst) {
            info!("Audio context started..!");
        }

        Ok(())
    }

    fn create_volume(&self, db: f64) -> Result<VolumeId> {
        let id = VolumeId(self.next_id());
        self.with_graph(|graph| {
            graph.volumes.insert(id, db);
            Ok(())
        })?;

        debug!("Created volume node {:?} at {:.2}dB", id, db);
        Ok(id)
    }

    fn set_volume_db(&self, volume: VolumeId, db: f64) -> Result<()> {
        self.with_graph(|graph| {
            let Some(level) = graph.volumes.get_mut(&volume) else {
                bail!(SoundtrackError::Engine(format!("Unknown volume node {:?}", volume)));
            };

            *level = db;
            Ok(())
        })
    }

    fn dispose_volume(&self, volume: VolumeId) -> Result<()> {
        self.with_graph(|graph| {
            graph.volumes.remove(&volume);
            Ok(())
        })
    }

    fn create_synth(&self, options: SynthOptions, output: VolumeId) -> Result<SynthId> {
        let id = SynthId(self.next_id());
        self.with_graph(|graph| {
            if !graph.volumes.contains_key(&output) {
                bail!(SoundtrackError::Engine(format!("Unknown volume node {:?}", output)));
            }

            graph.synths.insert(id, PolySynth::new(options, output));
            Ok(())
        })?;

        debug!(
            "Created synth {:?} with max polyphony {} -> {:?}",
            id, options.max_polyphony, output
        );
        Ok(id)
    }

    fn dispose_synth(&self, synth: SynthId) -> Result<()> {
        self.with_graph(|graph| {
            graph.synths.remove(&synth);
            Ok(())
        })
    }

    fn create_part(&self, synth: SynthId, events: Vec<NoteEvent>, start: f64) -> Result<PartId> {
        let id = PartId(self.next_id());
        let count = events.len();

        self.with_graph(|graph| {
            if !graph.synths.contains_key(&synth) {
                bail!(SoundtrackError::Engine(format!("Unknown synth {:?}", synth)));
            }

            graph.parts.insert(
                id,
                Part {
                    synth,
                    events,
                    start,
                    scheduled: true,
                },
            );
            Ok(())
        })?;

        debug!("Created part {:?} with {} events at {:.3}s", id, count, start);
        self.reschedule()?;

        Ok(id)
    }

    fn dispose_part(&self, part: PartId) -> Result<()> {
        let removed = self.with_graph(|graph| Ok(graph.parts.remove(&part).is_some()))?;

        if removed {
            debug!("Disposed part {:?}", part);
        }

        Ok(())
    }

    fn transport_start(&self) -> Result<()> {
        let mut transport = self.lock_transport()?;

        if transport.started_at.is_some() {
            debug!("Transport already started..!");
            return Ok(());
        }

        self.spawn_worker(&mut transport)
    }

    fn transport_stop(&self) -> Result<()> {
        let mut transport = self.lock_transport()?;

        Self::halt_worker(&mut transport);
        transport.started_at = None;
        transport.offset = 0.0;

        let dropped = self.dropped_notes();
        if dropped > 0 {
            debug!("Transport stopped, {} note(s) dropped over max polyphony so far..!", dropped);
        }

        Ok(())
    }

    fn transport_cancel(&self) -> Result<()> {
        self.with_graph(|graph| {
            graph
                .parts
                .values_mut()
                .for_each(|part| part.scheduled = false);
            Ok(())
        })
    }

    fn set_transport_position(&self, seconds: f64) -> Result<()> {
        let mut transport = self.lock_transport()?;
        let seconds = seconds.max(0.0);

        if transport.started_at.is_some() {
            Self::halt_worker(&mut transport);
            transport.offset = seconds;
            self.spawn_worker(&mut transport)?;
        } else {
            transport.offset = seconds;
        }

        Ok(())
    }

    fn transport_position(&self) -> f64 {
        self.transport
            .lock()
            .map(|transport| transport.position())
            .unwrap_or(0.0)
    }

    fn transport_state(&self) -> TransportState {
        match self.transport.lock() {
            Ok(transport) if transport.started_at.is_some() => TransportState::Started,
            _ => TransportState::Stopped,
        }
    }

    fn set_bpm(&self, bpm: f64) {
        if let Ok(mut transport) = self.transport.lock() {
            transport.bpm = bpm;
        }
    }

    fn bpm(&self) -> f64 {
        self.transport
            .lock()
            .map(|transport| transport.bpm)
            .unwrap_or(DEFAULT_BPM)
    }
}

impl<S: NoteSink> Drop for SoftwareEngine<S> {
    fn drop(&mut self) {
        if let Ok(mut transport) = self.transport.lock() {
            if let Some(tx) = transport.control_tx.take() {
                let _ = tx.send(ControlMsg::Stop);
            }
            if let Some(handle) = transport.worker_handle.take() {
                let _ = handle.join();
            }
        }
    }
}
