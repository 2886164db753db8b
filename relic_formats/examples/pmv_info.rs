use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use relic_formats::PmvDecoder;

#[derive(Parser)]
struct Args {
    /// Path to a .pmv movie to inspect.
    input: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut movie = PmvDecoder::open_path(&args.input)?;
    let header = *movie.header();
    println!(
        "PMV {}: {} frames, {}x{}, frame_delay={}ms ({} fps)",
        args.input.display(),
        header.frame_count,
        header.width,
        header.height,
        header.frame_delay_ms,
        header.frame_rate()
    );
    println!(
        "Audio: {} Hz (stored {})",
        header.sound_frequency, header.raw_sound_frequency
    );

    let mut samples = 0usize;
    let mut palette_updates = 0usize;
    while let Some(frame) = movie.decode_next_frame()? {
        samples += frame.audio.map_or(0, |audio| audio.samples.len());
        if frame.palette_changed {
            palette_updates += 1;
        }
    }
    println!(
        "Frames decoded: {}, audio samples: {}, palette updates: {}",
        movie.current_frame(),
        samples,
        palette_updates
    );
    Ok(())
}
