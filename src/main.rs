use anyhow::Result;
use clap::Parser;
use log::{debug, info, warn};
use midi_soundtrack::{Args, DefaultPlayer, SoundtrackConfig, extension_info, translate};
use std::sync::mpsc;
use std::time::Duration;

/// Extra time after the last note ends, so releases are not cut off.
const TAIL_S: f64 = 1.0;

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.describe {
        println!("{}", serde_json::to_string_pretty(&extension_info())?);
        return Ok(());
    }

    let Some(source) = args.source.as_deref() else {
        anyhow::bail!("No MIDI source given..!");
    };

    let player = DefaultPlayer::with_defaults(SoundtrackConfig::from(&args), args.verbose);

    info!("Loading MIDI: '{}'...", source);
    player.load_midi(source)?;
    player.set_volume(args.volume)?;

    let Some(song) = player.song() else {
        anyhow::bail!("Song was not retained after loading..!");
    };

    debug!(
        "Loaded song '{}' with {} notes across {} tracks, lasting {:.3}s..!",
        song.metadata
            .title
            .clone()
            .unwrap_or_else(|| "<unknown>".into()),
        song.note_count(),
        song.tracks.len(),
        song.duration()
    );

    if args.dry_run {
        info!("Previewing at most {} events..!", args.dry_run_max);
        for (i, ev) in translate(&song).iter().take(args.dry_run_max).enumerate() {
            info!(
                "Event {}: name={} time={:.3}s duration={:.3}s velocity={:.3}",
                i, ev.name, ev.time, ev.duration, ev.velocity
            );
        }
        return Ok(());
    }

    let (done_tx, done_rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        warn!("Ctrl-C received, stopping playback..!");
        let _ = done_tx.send(());
    })?;

    if args.delay_start > 0 {
        info!("Starting playback in {} seconds..!", args.delay_start);
        if done_rx
            .recv_timeout(Duration::from_secs(args.delay_start))
            .is_ok()
        {
            return Ok(());
        }
    }

    player.play_midi()?;
    let _ = done_rx.recv_timeout(Duration::from_secs_f64(song.duration() + TAIL_S));

    player.stop_midi()?;
    player.dispose()?;
    info!("Playback finished, exiting..!");

    Ok(())
}
