use std::io::{Read, Seek};
use std::time::Duration;

use log::{debug, warn};
use relic_formats::PmvDecoder;
use serde::Serialize;

use crate::host::Collaborators;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlaybackOutcome {
    Finished,
    Quit,
    Aborted { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaybackSummary {
    pub name: String,
    pub width: u16,
    pub height: u16,
    pub frame_delay_ms: u16,
    pub frames_presented: u32,
    pub audio_packets: u32,
    pub audio_samples: usize,
    pub palette_updates: u32,
    #[serde(flatten)]
    pub outcome: PlaybackOutcome,
}

/// Play `movie` to completion on the calling thread. The movie is centred
/// on the display, the palette is pushed whenever the decoder marks it
/// dirty, input is drained every iteration and the clock sleeps the header's
/// frame delay. A decode error ends this movie only.
pub fn play_movie<R: Read + Seek>(
    name: &str,
    movie: &mut PmvDecoder<R>,
    host: &Collaborators,
) -> PlaybackSummary {
    let header = *movie.header();
    let (screen_width, screen_height) = host.display.screen_size();
    let x = (i32::from(screen_width) - i32::from(header.width)) / 2;
    let y = (i32::from(screen_height) - i32::from(header.height)) / 2;
    let delay = Duration::from_millis(u64::from(header.frame_delay_ms));

    let mut summary = PlaybackSummary {
        name: name.to_string(),
        width: header.width,
        height: header.height,
        frame_delay_ms: header.frame_delay_ms,
        frames_presented: 0,
        audio_packets: 0,
        audio_samples: 0,
        palette_updates: 0,
        outcome: PlaybackOutcome::Finished,
    };
    debug!(
        "playing '{name}': {} frames of {}x{} at ({x}, {y})",
        header.frame_count, header.width, header.height
    );

    loop {
        if host.input.should_quit() {
            summary.outcome = PlaybackOutcome::Quit;
            break;
        }
        if movie.end_of_video() {
            break;
        }

        match movie.decode_next_frame() {
            Ok(Some(frame)) => {
                if let Some(audio) = frame.audio.as_ref() {
                    host.audio.queue_samples(audio);
                    summary.audio_packets += 1;
                    summary.audio_samples += audio.samples.len();
                }
                if movie.has_dirty_palette() {
                    host.display.set_palette(movie.palette());
                    movie.clear_dirty_palette();
                    summary.palette_updates += 1;
                }
                host.display.present_frame(x, y, movie.surface());
                summary.frames_presented += 1;
            }
            Ok(None) => break,
            Err(err) => {
                warn!(
                    "movie '{name}' aborted after {} frames: {err}",
                    summary.frames_presented
                );
                summary.outcome = PlaybackOutcome::Aborted {
                    error: err.to_string(),
                };
                break;
            }
        }

        host.input.drain_events();
        host.clock.sleep(delay);
    }

    summary
}
