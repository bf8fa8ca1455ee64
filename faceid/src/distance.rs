/// Distance reported for vectors that cannot be compared.
///
/// It is at or above every match threshold, so malformed vectors never match.
pub const MAX_DISTANCE: f32 = 1.0;

/// Compute the Euclidean distance between two face descriptors.
///
/// Returns 0 for identical vectors. Returns [`MAX_DISTANCE`] when the
/// lengths differ or either vector is empty.
///
/// Uses f64 intermediate precision.
pub fn distance(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return MAX_DISTANCE;
    }

    let mut sum: f64 = 0.0;
    for i in 0..a.len() {
        let d = a[i] as f64 - b[i] as f64;
        sum += d * d;
    }
    sum.sqrt() as f32
}

/// Like [`distance`], but also returns [`MAX_DISTANCE`] unless both vectors
/// have exactly `dim` components.
pub fn distance_dim(a: &[f32], b: &[f32], dim: usize) -> f32 {
    if a.len() != dim || b.len() != dim {
        return MAX_DISTANCE;
    }
    distance(a, b)
}
