use crate::types::Embedding;

/// Computes the elementwise mean of the embeddings whose length is `dim`.
///
/// Returns `None` when no valid embedding remains, which puts the person
/// back into the unindexed state. Runs in O(k·d).
pub fn compute(embeddings: &[Embedding], dim: usize) -> Option<Vec<f32>> {
    mean(embeddings.iter().map(|e| e.vector.as_slice()), dim)
}

/// Elementwise mean over `vectors` of length `dim`. Other lengths are skipped.
pub fn mean<'a, I>(vectors: I, dim: usize) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    if dim == 0 {
        return None;
    }
    let mut sum = vec![0.0f64; dim];
    let mut count = 0usize;
    for v in vectors {
        if v.len() != dim {
            continue;
        }
        for (s, x) in sum.iter_mut().zip(v) {
            *s += *x as f64;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    let n = count as f64;
    Some(sum.into_iter().map(|s| (s / n) as f32).collect())
}
