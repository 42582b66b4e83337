use crate::engine::AudioEngine;
use crate::error::SoundtrackError;
use crate::fetch::Fetcher;
use crate::midi_importer::MidiParser;
use crate::model::config::DEFAULT_VOLUME_PERCENT;
use crate::player::Player;
use anyhow::{Result, bail};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const EXTENSION_ID: &str = "midisoundtrack";
pub const EXTENSION_NAME: &str = "MIDI Soundtrack";

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Command,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    String,
    Number,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentInfo {
    #[serde(rename = "type")]
    pub kind: ArgumentType,
    pub default_value: Value,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    pub opcode: &'static str,
    pub block_type: BlockType,
    pub text: &'static str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<&'static str, ArgumentInfo>,
}

/// What a host needs to register the extension's blocks.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ExtensionInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub blocks: Vec<BlockInfo>,
}

fn command(opcode: &'static str, text: &'static str) -> BlockInfo {
    BlockInfo {
        opcode,
        block_type: BlockType::Command,
        text,
        arguments: BTreeMap::new(),
    }
}

pub fn extension_info() -> ExtensionInfo {
    let mut load = command("loadMidi", "load midi from [URL]");
    load.arguments.insert(
        "URL",
        ArgumentInfo {
            kind: ArgumentType::String,
            default_value: Value::from(""),
        },
    );

    let mut volume = command("setVolume", "set midi volume to [VOLUME] %");
    volume.arguments.insert(
        "VOLUME",
        ArgumentInfo {
            kind: ArgumentType::Number,
            default_value: Value::from(DEFAULT_VOLUME_PERCENT as i64),
        },
    );

    ExtensionInfo {
        id: EXTENSION_ID,
        name: EXTENSION_NAME,
        blocks: vec![
            load,
            command("playMidi", "play midi"),
            command("stopMidi", "stop midi"),
            volume,
        ],
    }
}

/// A block invocation with its arguments already cast.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockCall {
    LoadMidi { url: String },
    PlayMidi,
    StopMidi,
    SetVolume { percent: f64 },
}

/// Casts a loosely typed argument to text. Absent or null arguments become empty.
fn cast_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Casts a loosely typed argument to a number. Text that is not numeric becomes zero.
fn cast_number(name: &str, value: Option<&Value>, default: f64) -> Result<f64> {
    let number = match value {
        None | Some(Value::Null) => default,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().unwrap_or(0.0)
            }
        }
        Some(_) => bail!(SoundtrackError::InvalidArgument {
            name: name.to_string(),
            reason: String::from("expected a number"),
        }),
    };

    Ok(if number.is_nan() { 0.0 } else { number })
}

impl BlockCall {
    pub fn from_opcode(opcode: &str, args: &Map<String, Value>) -> Result<Self> {
        let call = match opcode {
            "loadMidi" => BlockCall::LoadMidi {
                url: cast_string(args.get("URL")),
            },
            "playMidi" => BlockCall::PlayMidi,
            "stopMidi" => BlockCall::StopMidi,
            "setVolume" => BlockCall::SetVolume {
                percent: cast_number("VOLUME", args.get("VOLUME"), DEFAULT_VOLUME_PERCENT)?,
            },
            other => bail!(SoundtrackError::UnknownBlock(other.to_string())),
        };

        Ok(call)
    }

    pub fn opcode(&self) -> &'static str {
        match self {
            BlockCall::LoadMidi { .. } => "loadMidi",
            BlockCall::PlayMidi => "playMidi",
            BlockCall::StopMidi => "stopMidi",
            BlockCall::SetVolume { .. } => "setVolume",
        }
    }
}

impl<P: MidiParser, E: AudioEngine, F: Fetcher> Player<P, E, F> {
    pub fn dispatch(&self, call: &BlockCall) -> Result<()> {
        match call {
            BlockCall::LoadMidi { url } => self.load_midi(url),
            BlockCall::PlayMidi => self.play_midi(),
            BlockCall::StopMidi => self.stop_midi(),
            BlockCall::SetVolume { percent } => self.set_volume(*percent),
        }
    }

    /// Casts the arguments of a raw block invocation and runs it.
    pub fn run_block(&self, opcode: &str, args: &Map<String, Value>) -> Result<()> {
        let call = BlockCall::from_opcode(opcode, args)?;
        self.dispatch(&call)
    }
}
