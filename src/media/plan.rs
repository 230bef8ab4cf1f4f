use std::time::Duration;

use super::SampleWindow;

/// Frames extracted per video unless configured otherwise.
pub const DEFAULT_FRAME_COUNT: usize = 3;

/// Length of one audio sample.
const SAMPLE_LENGTH: Duration = Duration::from_secs(60);

/// Media up to this length gets a single sample from the start.
const SINGLE_SAMPLE_LIMIT: Duration = Duration::from_secs(120);

/// Media longer than this also gets a middle sample.
const MIDDLE_SAMPLE_THRESHOLD: Duration = Duration::from_secs(180);

/// Plan the audio windows to extract for transcription.
///
/// Short media get one window from the start. Longer media get windows at
/// the beginning, middle (only past three minutes) and end, in that order.
pub fn plan_audio_samples(total: Duration) -> Vec<SampleWindow> {
    if total <= SINGLE_SAMPLE_LIMIT {
        return vec![SampleWindow {
            offset: Duration::ZERO,
            duration: total.min(SAMPLE_LENGTH),
        }];
    }

    let mut windows = vec![SampleWindow {
        offset: Duration::ZERO,
        duration: SAMPLE_LENGTH,
    }];

    if total > MIDDLE_SAMPLE_THRESHOLD {
        windows.push(SampleWindow {
            offset: (total / 2).saturating_sub(SAMPLE_LENGTH / 2),
            duration: SAMPLE_LENGTH,
        });
    }

    windows.push(SampleWindow {
        offset: total.saturating_sub(SAMPLE_LENGTH),
        duration: SAMPLE_LENGTH,
    });

    windows
}

/// Plan the timestamps of still frames.
///
/// Three frames favour the very start and very end with one midpoint; any
/// other count is spread evenly. Timestamps always fall inside the media.
pub fn plan_frame_timestamps(total: Duration, count: usize) -> Vec<Duration> {
    let secs = total.as_secs_f64();

    let raw: Vec<f64> = if count == 3 {
        vec![
            (0.05 * secs).max(5.0),
            0.5 * secs,
            (secs - 10.0).max(0.95 * secs),
        ]
    } else {
        (0..count)
            .map(|i| secs * (i + 1) as f64 / (count + 1) as f64)
            .collect()
    };

    // ffmpeg emits nothing when seeking to or past the end.
    let last_valid = (secs * 0.99).max(0.0);
    raw.into_iter()
        .map(|t| Duration::from_secs_f64(t.clamp(0.0, last_valid)))
        .collect()
}
