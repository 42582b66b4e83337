use thiserror::Error;

/// Failure kinds surfaced by the soundtrack operations.
///
/// Operations return `anyhow::Result`, so hosts that care about the kind can
/// `downcast_ref::<SoundtrackError>()` on the error they receive.
#[derive(Debug, Error)]
pub enum SoundtrackError {
    #[error("Failed to load playback libraries: {0}")]
    LibraryLoad(String),

    #[error("Failed to fetch MIDI from '{url}': {reason}")]
    Fetch { url: String, reason: String },

    #[error("Failed to parse MIDI: {0}")]
    Parse(String),

    #[error("Audio engine error: {0}")]
    Engine(String),

    #[error("Unknown block opcode '{0}'")]
    UnknownBlock(String),

    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },
}
