const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Converts a linear gain ratio to decibels. A gain of zero is `-inf` dB (silence).
pub fn gain_to_db(gain: f64) -> f64 {
    20.0 * gain.log10()
}

/// Clamps a volume percentage into `0..=100`. NaN is treated as zero.
pub fn clamp_volume_percent(percent: f64) -> f64 {
    if percent.is_nan() {
        return 0.0;
    }

    percent.clamp(0.0, 100.0)
}

pub fn volume_percent_to_db(percent: f64) -> f64 {
    gain_to_db(clamp_volume_percent(percent) / 100.0)
}

/// Scientific pitch name for a MIDI note number, where 60 is `C4`.
pub fn midi_note_name(midi: u8) -> String {
    let octave = (midi / 12) as i32 - 1;
    format!("{}{}", PITCH_CLASSES[(midi % 12) as usize], octave)
}
