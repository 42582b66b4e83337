use crate::engine::software::SoftwareEngine;
use crate::engine::synth::LogSink;
use crate::engine::{AudioEngine, PartId, SynthId, SynthOptions, VolumeId};
use crate::error::SoundtrackError;
use crate::fetch::{DefaultFetcher, Fetcher};
use crate::loader::{Libraries, LibraryLoader};
use crate::midi_importer::{MidiParser, MidlyParser};
use crate::model::config::SoundtrackConfig;
use crate::model::song::Song;
use crate::translator::translate;
use crate::util::volume_percent_to_db;
use anyhow::{Result, bail};
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No song has been loaded yet.
    Idle,
    LoadedStopped,
    Playing,
}

#[derive(Debug, Default)]
struct Session {
    context_started: bool,
    volume: Option<VolumeId>,
    synth: Option<SynthId>,
    part: Option<PartId>,
    song: Option<Arc<Song>>,
    playing: bool,
}

/// Loads songs and drives their playback through an [`AudioEngine`].
///
/// The synth and volume node are created on the first load and reused by every later one.
/// Only the part bound to the current song is replaced per load.
pub struct Player<P: MidiParser, E: AudioEngine, F: Fetcher> {
    config: SoundtrackConfig,
    loader: LibraryLoader<P, E>,
    fetcher: F,
    session: Mutex<Session>,
}

pub type DefaultPlayer = Player<MidlyParser, SoftwareEngine<LogSink>, DefaultFetcher>;

impl DefaultPlayer {
    pub fn with_defaults(config: SoundtrackConfig, verbose: bool) -> Self {
        let fetcher = DefaultFetcher::new(config.max_fetch_bytes);
        let loader = LibraryLoader::new(move || {
            Ok(Libraries {
                parser: MidlyParser,
                engine: SoftwareEngine::new(LogSink::new(verbose)),
            })
        });

        Self::new(config, loader, fetcher)
    }
}

impl<P: MidiParser, E: AudioEngine, F: Fetcher> Player<P, E, F> {
    pub fn new(config: SoundtrackConfig, loader: LibraryLoader<P, E>, fetcher: F) -> Self {
        Self {
            config,
            loader,
            fetcher,
            session: Mutex::new(Session::default()),
        }
    }

    fn lock_session(&self) -> Result<MutexGuard<'_, Session>> {
        let Ok(session) = self.session.lock() else {
            bail!("Failed to lock the playback session..!");
        };

        Ok(session)
    }

    /// Stops the transport, clears its schedule and disposes the live part.
    fn teardown(engine: &E, session: &mut Session) -> Result<()> {
        engine.reset_transport()?;
        session.playing = false;

        if let Some(part) = session.part.take() {
            engine.dispose_part(part)?;
            debug!("Disposed previous part {:?}", part);
        }

        Ok(())
    }

    /// Creates the volume node and synth on first use.
    fn prepare_nodes(&self, engine: &E, session: &mut Session) -> Result<()> {
        if !session.context_started {
            engine.start_context()?;
            session.context_started = true;
        }

        let volume = match session.volume {
            Some(volume) => volume,
            None => {
                let volume = engine.create_volume(self.config.initial_volume_db)?;
                session.volume = Some(volume);
                volume
            }
        };

        if session.synth.is_none() {
            let options = SynthOptions {
                max_polyphony: self.config.max_polyphony,
            };
            session.synth = Some(engine.create_synth(options, volume)?);
        }

        Ok(())
    }

    /// Fetches, parses and schedules the song at `url`, leaving the transport stopped at zero.
    ///
    /// Prior scheduling is torn down before anything is fetched. If fetching or parsing fails
    /// the previous song stays recorded but its part is already gone.
    pub fn load_midi(&self, url: &str) -> Result<()> {
        if let Some(libraries) = self.loader.get() {
            let mut session = self.lock_session()?;
            Self::teardown(&libraries.engine, &mut session)?;
        }

        let libraries = self.loader.ensure()?;
        let engine = &libraries.engine;

        {
            let mut session = self.lock_session()?;
            self.prepare_nodes(engine, &mut session)?;
        }

        info!("Fetching MIDI from '{}'..!", url);
        let bytes = self.fetcher.fetch(url)?;
        let song = libraries.parser.parse(&bytes)?;
        let events = translate(&song);

        let mut session = self.lock_session()?;

        // another load may have installed its part while this one was fetching
        Self::teardown(engine, &mut session)?;

        if let Some(bpm) = song.first_tempo_bpm() {
            engine.set_bpm(bpm);
            debug!("Transport tempo set to {:.2} bpm", bpm);
        }

        let Some(synth) = session.synth else {
            bail!(SoundtrackError::Engine(String::from(
                "synth was released during load"
            )));
        };

        let count = events.len();
        session.part = Some(engine.create_part(synth, events, 0.0)?);
        engine.set_transport_position(0.0)?;

        info!(
            "Loaded song: '{}' with {} scheduled events..!",
            song.metadata.title.as_deref().unwrap_or("No Title"),
            count
        );
        session.song = Some(Arc::new(song));

        Ok(())
    }

    /// Starts the transport. Does nothing without a loaded song or while already playing.
    pub fn play_midi(&self) -> Result<()> {
        let mut session = self.lock_session()?;

        if session.song.is_none() {
            debug!("Ignoring play: no song loaded..!");
            return Ok(());
        }

        if session.playing {
            debug!("Ignoring play: already playing..!");
            return Ok(());
        }

        let Some(libraries) = self.loader.get() else {
            return Ok(());
        };

        libraries.engine.transport_start()?;
        session.playing = true;
        info!("Playback started..!");

        Ok(())
    }

    /// Halts the transport and rewinds it to zero.
    pub fn stop_midi(&self) -> Result<()> {
        let Some(libraries) = self.loader.get() else {
            debug!("Ignoring stop: libraries not loaded..!");
            return Ok(());
        };

        let mut session = self.lock_session()?;
        libraries.engine.transport_stop()?;
        libraries.engine.set_transport_position(0.0)?;

        if session.playing {
            info!("Playback stopped..!");
        }
        session.playing = false;

        Ok(())
    }

    /// Sets the output level from a percentage, clamped to `0..=100`.
    /// Does nothing until a load has created the volume node.
    pub fn set_volume(&self, percent: f64) -> Result<()> {
        let session = self.lock_session()?;

        let (Some(volume), Some(libraries)) = (session.volume, self.loader.get()) else {
            debug!("Ignoring volume change to {}%: no volume node yet..!", percent);
            return Ok(());
        };

        let db = volume_percent_to_db(percent);
        libraries.engine.set_volume_db(volume, db)?;
        debug!("Volume set to {}% ({:.2}dB)", percent, db);

        Ok(())
    }

    /// Tears the whole session down, releasing the synth and volume node.
    pub fn dispose(&self) -> Result<()> {
        let mut session = self.lock_session()?;

        if let Some(libraries) = self.loader.get() {
            let engine = &libraries.engine;
            Self::teardown(engine, &mut session)?;

            if let Some(synth) = session.synth.take() {
                engine.dispose_synth(synth)?;
            }
            if let Some(volume) = session.volume.take() {
                engine.dispose_volume(volume)?;
            }
        }

        *session = Session::default();
        info!("Playback session disposed..!");

        Ok(())
    }

    pub fn state(&self) -> PlaybackState {
        match self.session.lock() {
            Ok(session) if session.playing => PlaybackState::Playing,
            Ok(session) if session.song.is_some() => PlaybackState::LoadedStopped,
            _ => PlaybackState::Idle,
        }
    }

    pub fn song(&self) -> Option<Arc<Song>> {
        self.session
            .lock()
            .ok()
            .and_then(|session| session.song.clone())
    }

    pub fn libraries(&self) -> Option<Arc<Libraries<P, E>>> {
        self.loader.get()
    }

    pub fn config(&self) -> &SoundtrackConfig {
        &self.config
    }
}
