//! Observed Speed Index from the screenshot filmstrip.
//!
//! Each screenshot is decoded into per-channel colour histograms. Visual
//! progress of a frame is how far its histogram moved from the first
//! frame towards the last one, in whole percent. Speed Index is the area
//! above the visual progress curve from the navigation start.

use crate::handlers::screenshots::SyntheticScreenshot;
use crate::helpers::NavigationScope;
use crate::types::MicroSeconds;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::debug;
use std::sync::Arc;

/// Pixel counts per value for the red, green and blue channels
pub type Histogram = [[u32; 256]; 3];

/// Decode a `data:` URI (or bare base64) image into its histogram
///
/// Returns `None` when the payload is not valid base64 or not an image.
pub fn histogram(data_uri: &str) -> Option<Histogram> {
    let payload = data_uri.split_once(',').map_or(data_uri, |(_, data)| data);
    let bytes = STANDARD.decode(payload).ok()?;
    let image = image::load_from_memory(&bytes).ok()?.to_rgb8();

    let mut histogram = [[0u32; 256]; 3];
    for pixel in image.pixels() {
        for (channel, value) in pixel.0.iter().enumerate() {
            histogram[channel][*value as usize] += 1;
        }
    }
    Some(histogram)
}

/// Progress of `current` between `initial` and `target`, 0 to 100
pub fn visual_progress(current: &Histogram, initial: &Histogram, target: &Histogram) -> u32 {
    let mut matched: u64 = 0;
    let mut total: u64 = 0;
    for channel in 0..3 {
        for value in 0..256 {
            let initial_count = initial[channel][value];
            let current_diff = current[channel][value].abs_diff(initial_count) as u64;
            let target_diff = target[channel][value].abs_diff(initial_count) as u64;
            matched += current_diff.min(target_diff);
            total += target_diff;
        }
    }
    if total == 0 {
        return 100;
    }
    (matched * 100 / total) as u32
}

/// Speed Index (ms) of `frames`, given as `(timestamp, progress)` pairs in
/// time order, measured from `start`
pub fn speed_index_from_progress(start: MicroSeconds, frames: &[(MicroSeconds, u32)]) -> f64 {
    let mut speed_index = 0.0;
    let mut previous_ts = start;
    let mut previous_progress = 0;
    for &(ts, progress) in frames {
        let elapsed = (ts - previous_ts).as_millis_f64().max(0.0);
        speed_index += elapsed * (1.0 - previous_progress as f64 / 100.0);
        previous_ts = ts;
        previous_progress = progress;
    }
    speed_index
}

/// Speed Index observed in the screenshots of the navigation in `scope`
///
/// **Public** - feeds the optimistic Speed Index estimate
///
/// # Returns
/// `None` when no screenshot in the navigation window decodes.
pub fn observed_speed_index(
    screenshots: &[Arc<SyntheticScreenshot>],
    scope: &NavigationScope,
) -> Option<f64> {
    let frames: Vec<(MicroSeconds, Histogram)> = screenshots
        .iter()
        .filter(|shot| scope.contains(shot.ts))
        .filter_map(|shot| match histogram(&shot.data_uri) {
            Some(histogram) => Some((shot.ts, histogram)),
            None => {
                debug!("Skipping undecodable screenshot {}", shot.index);
                None
            }
        })
        .collect();

    let (_, initial) = frames.first()?;
    let (_, target) = frames.last()?;
    let progress: Vec<(MicroSeconds, u32)> = frames
        .iter()
        .map(|(ts, histogram)| (*ts, visual_progress(histogram, initial, target)))
        .collect();

    let speed_index = speed_index_from_progress(scope.window.min, &progress);
    debug!(
        "Observed Speed Index {:.0}ms over {} frames",
        speed_index,
        progress.len()
    );
    Some(speed_index)
}
