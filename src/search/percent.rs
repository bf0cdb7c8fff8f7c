//! Similarity score → human-facing percentage.

/// Cosine similarity in `[-1, 1]` → `[0, 100]`.
pub fn percent_from_cosine(score: f32) -> f64 {
    (score as f64 + 1.0) / 2.0 * 100.0
}

/// Sum of two cosine similarities, `[-2, 2]` → `[0, 100]`.
pub fn percent_from_fused(score: f32) -> f64 {
    (score as f64 + 2.0) / 4.0 * 100.0
}

/// Two decimal places, clamped to `[0, 100]`. Presentation only; sorting uses
/// the unrounded value.
pub fn round_percent(percent: f64) -> f64 {
    ((percent * 100.0).round() / 100.0).clamp(0.0, 100.0)
}
