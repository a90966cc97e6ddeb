//! Cumulative weighted draw shared by loop, melody, and jingle selection.

use rand::Rng;

/// Slack that lets the walk settle on a candidate despite float rounding.
pub const DRAW_EPSILON: f64 = 0.01;

/// Draw an index from `weights`.
///
/// `rest` is extra weight for choosing nothing; when the draw lands in it
/// the result is `None`. Draws `uniform(0, total)` and walks the candidates,
/// subtracting each weight until the remainder drops to `DRAW_EPSILON`.
pub fn choose<R: Rng + ?Sized>(rng: &mut R, weights: &[f64], rest: f64) -> Option<usize> {
    if weights.is_empty() {
        return None;
    }
    let total: f64 = weights.iter().sum::<f64>() + rest.max(0.0);
    let mut choice = rng.gen::<f64>() * total;
    for (i, w) in weights.iter().enumerate() {
        choice -= w;
        if choice <= DRAW_EPSILON {
            return Some(i);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn empty_yields_none() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(choose(&mut rng, &[], 5.0), None);
    }

    #[test]
    fn single_candidate_always_wins() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        for _ in 0..100 {
            assert_eq!(choose(&mut rng, &[0.3], 0.0), Some(0));
        }
    }

    #[test]
    fn zero_weights_fall_to_first() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(choose(&mut rng, &[0.0, 0.0], 0.0), Some(0));
    }

    #[test]
    fn dominant_rest_usually_picks_nothing() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let nothing = (0..1000)
            .filter(|_| choose(&mut rng, &[1.0], 1000.0).is_none())
            .count();
        assert!(nothing > 980, "nothing chosen {nothing} times");
    }

    #[test]
    fn frequencies_follow_weights() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut counts = [0usize; 2];
        for _ in 0..10_000 {
            counts[choose(&mut rng, &[1.0, 3.0], 0.0).unwrap()] += 1;
        }
        let ratio = counts[1] as f64 / counts[0] as f64;
        assert!((2.5..3.5).contains(&ratio), "ratio {ratio}");
    }

    #[test]
    fn deterministic_for_a_seed() {
        let run = || {
            let mut rng = ChaCha8Rng::seed_from_u64(42);
            (0..50)
                .map(|_| choose(&mut rng, &[1.0, 2.0, 0.5], 0.2))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}
