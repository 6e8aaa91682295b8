use crate::scene_detector::SceneBoundary;

/// Picks `count` representative frame numbers for a scene.
///
/// Samples are spaced by `round(scene_length / count)` starting at the scene's
/// first frame. Two edge cases are deliberate:
///
/// - A degenerate scene (length 0, or one short enough that the stride rounds
///   to 0) yields `count` identical frame numbers. The sampler does not
///   deduplicate; downstream extraction collapses the duplicate decode work
///   and the resulting ids stay unique through the within-scene index.
/// - Samples are not clamped to the scene's end frame. When the stride rounds
///   up, the last sample can land past the scene (or past the end of the
///   stream); such frames fail to decode and are skipped per-frame.
pub fn sample(scene: &SceneBoundary, count: usize) -> Vec<u64> {
    let scene_length = scene.len();
    let stride = (scene_length as f64 / count as f64).round() as u64;

    (0..count as u64)
        .map(|k| scene.start_frame + stride * k)
        .collect()
}
