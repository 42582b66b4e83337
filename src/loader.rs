use crate::engine::AudioEngine;
use crate::error::SoundtrackError;
use crate::midi_importer::MidiParser;
use anyhow::{Result, bail};
use log::{debug, info};
use std::sync::{Arc, Mutex};

/// The collaborators a player needs before it can load anything.
#[derive(Debug)]
pub struct Libraries<P, E> {
    pub parser: P,
    pub engine: E,
}

type Resolver<P, E> = Box<dyn Fn() -> Result<Libraries<P, E>> + Send + Sync>;

/// Resolves the parser and engine on first use and hands out the same instances afterwards.
///
/// Concurrent callers wait on the same lock, so a successful resolution happens exactly once.
/// A failed resolution is not remembered and the next `ensure` runs the resolver again.
pub struct LibraryLoader<P, E> {
    resolver: Resolver<P, E>,
    loaded: Mutex<Option<Arc<Libraries<P, E>>>>,
}

impl<P: MidiParser, E: AudioEngine> LibraryLoader<P, E> {
    pub fn new<R>(resolver: R) -> Self
    where
        R: Fn() -> Result<Libraries<P, E>> + Send + Sync + 'static,
    {
        Self {
            resolver: Box::new(resolver),
            loaded: Mutex::new(None),
        }
    }

    pub fn preloaded(parser: P, engine: E) -> Self {
        Self {
            resolver: Box::new(|| -> Result<Libraries<P, E>> {
                bail!(SoundtrackError::LibraryLoad(String::from(
                    "preloaded libraries were released"
                )))
            }),
            loaded: Mutex::new(Some(Arc::new(Libraries { parser, engine }))),
        }
    }

    pub fn ensure(&self) -> Result<Arc<Libraries<P, E>>> {
        let Ok(mut loaded) = self.loaded.lock() else {
            bail!(SoundtrackError::LibraryLoad(String::from(
                "Failed to lock the library loader..!"
            )));
        };

        if let Some(libraries) = loaded.as_ref() {
            return Ok(Arc::clone(libraries));
        }

        info!("Loading playback libraries..!");
        let libraries = (self.resolver)()
            .map_err(|e| SoundtrackError::LibraryLoad(format!("{:#}", e)))?;
        let libraries = Arc::new(libraries);
        *loaded = Some(Arc::clone(&libraries));
        debug!("Playback libraries ready..!");

        Ok(libraries)
    }

    /// The resolved libraries, without triggering resolution.
    pub fn get(&self) -> Option<Arc<Libraries<P, E>>> {
        self.loaded.lock().ok().and_then(|loaded| loaded.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.get().is_some()
    }
}
