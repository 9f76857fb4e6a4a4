/// Cosine threshold above which two embeddings are the same idea.
pub const HIGH_SIMILARITY: f32 = 0.8;

/// Cosine similarity in [-1, 1]. HIGHER is closer.
///
/// Unrolled by 8 so LLVM can keep dot and both norms in vector registers.
/// `None` when the dimensions differ: the vectors come from different
/// embedding spaces and are not comparable.
/// A zero vector has no direction and is similar to nothing (returns 0).
#[inline(always)]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    let len = a.len();

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    let chunks = a.chunks_exact(8);
    let b_chunks = b.chunks_exact(8);
    let remainder_start = len - len % 8;

    for (ac, bc) in chunks.zip(b_chunks) {
        dot += ac[0]*bc[0] + ac[1]*bc[1] + ac[2]*bc[2] + ac[3]*bc[3] +
        ac[4]*bc[4] + ac[5]*bc[5] + ac[6]*bc[6] + ac[7]*bc[7];

        norm_a += ac[0]*ac[0] + ac[1]*ac[1] + ac[2]*ac[2] + ac[3]*ac[3] +
        ac[4]*ac[4] + ac[5]*ac[5] + ac[6]*ac[6] + ac[7]*ac[7];

        norm_b += bc[0]*bc[0] + bc[1]*bc[1] + bc[2]*bc[2] + bc[3]*bc[3] +
        bc[4]*bc[4] + bc[5]*bc[5] + bc[6]*bc[6] + bc[7]*bc[7];
    }

    for i in remainder_start..len {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    if norm_a == 0.0 || norm_b == 0.0 { return Some(0.0); }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Strictly greater than `threshold`: a pair sitting exactly on it is not similar.
/// Mismatched dimensions are never similar.
pub fn are_similar(a: &[f32], b: &[f32], threshold: f32) -> bool {
    matches!(cosine_similarity(a, b), Some(sim) if sim > threshold)
}
