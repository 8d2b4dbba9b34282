//! Isotonic Regression (Pool Adjacent Violators)
//!
//! L2-optimal monotone fit over ladder mid probabilities. The native sweep
//! fits non-increasing sequences; the non-decreasing case negates in and
//! out. Output is clipped to [0, 1].

use super::Direction;

/// Fit a monotone curve to `values` with the given `weights`.
///
/// Inputs must be equal-length; weights must be positive.
pub fn fit(values: &[f64], weights: &[f64], direction: Direction) -> Vec<f64> {
    debug_assert_eq!(values.len(), weights.len());

    let mut fitted = match direction {
        Direction::Nonincreasing => pav_nonincreasing(values, weights),
        Direction::Nondecreasing => {
            let negated: Vec<f64> = values.iter().map(|v| -v).collect();
            let mut out = pav_nonincreasing(&negated, weights);
            for v in &mut out {
                *v = -*v;
            }
            out
        }
    };

    for v in &mut fitted {
        *v = v.clamp(0.0, 1.0);
    }
    fitted
}

/// Left-to-right sweep: whenever a block rises above its left neighbor,
/// pool them into a weighted average and re-check leftward until the
/// prefix is monotone again.
fn pav_nonincreasing(values: &[f64], weights: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }

    // (weighted mean, total weight, member count)
    let mut blocks: Vec<(f64, f64, usize)> = Vec::with_capacity(values.len());

    for (&value, &weight) in values.iter().zip(weights) {
        blocks.push((value, weight, 1));
        while blocks.len() >= 2 {
            let last = blocks[blocks.len() - 1];
            let prev = blocks[blocks.len() - 2];
            if last.0 <= prev.0 {
                break;
            }
            let pooled_weight = last.1 + prev.1;
            let pooled_mean = (last.0 * last.1 + prev.0 * prev.1) / pooled_weight;
            blocks.truncate(blocks.len() - 2);
            blocks.push((pooled_mean, pooled_weight, last.2 + prev.2));
        }
    }

    let mut out = Vec::with_capacity(values.len());
    for (mean, _, count) in blocks {
        out.extend(std::iter::repeat(mean).take(count));
    }

    // Final forward propagation: clamp any residual rise.
    for j in 1..out.len() {
        if out[j] > out[j - 1] {
            out[j] = out[j - 1];
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_weights(n: usize) -> Vec<f64> {
        vec![1.0; n]
    }

    fn is_monotone(values: &[f64], direction: Direction) -> bool {
        values.windows(2).all(|w| match direction {
            Direction::Nonincreasing => w[0] >= w[1] - 1e-12,
            Direction::Nondecreasing => w[0] <= w[1] + 1e-12,
        })
    }

    #[test]
    fn output_is_monotone_and_bounded() {
        let inputs: &[&[f64]] = &[
            &[0.8, 0.4, 0.6, 0.3, 0.1],
            &[0.1, 0.9, 0.2, 0.8, 0.3],
            &[0.5],
            &[],
            &[1.2, -0.1, 0.5],
        ];
        for input in inputs {
            for direction in [Direction::Nonincreasing, Direction::Nondecreasing] {
                let out = fit(input, &unit_weights(input.len()), direction);
                assert_eq!(out.len(), input.len());
                assert!(is_monotone(&out, direction), "{:?} {:?}", input, direction);
                assert!(out.iter().all(|v| (0.0..=1.0).contains(v)));
            }
        }
    }

    #[test]
    fn idempotent() {
        let input = [0.8, 0.4, 0.6, 0.3, 0.1];
        let w = unit_weights(input.len());
        let once = fit(&input, &w, Direction::Nonincreasing);
        let twice = fit(&once, &w, Direction::Nonincreasing);
        assert_eq!(once, twice);
    }

    #[test]
    fn monotone_input_is_identity() {
        let input = [0.9, 0.7, 0.7, 0.4, 0.1];
        let out = fit(&input, &unit_weights(input.len()), Direction::Nonincreasing);
        assert_eq!(out, input.to_vec());

        let rising = [0.1, 0.4, 0.7, 0.7, 0.9];
        let out = fit(&rising, &unit_weights(rising.len()), Direction::Nondecreasing);
        assert_eq!(out, rising.to_vec());
    }

    #[test]
    fn pools_adjacent_violators() {
        let input = [0.8, 0.4, 0.6, 0.3, 0.1];
        let out = fit(&input, &unit_weights(input.len()), Direction::Nonincreasing);
        // 0.4 then 0.6 violates; they pool to their average.
        assert!((out[1] - 0.5).abs() < 1e-12);
        assert!((out[2] - 0.5).abs() < 1e-12);
        assert_eq!(out[0], 0.8);
        assert_eq!(out[3], 0.3);
        assert_eq!(out[4], 0.1);
    }

    #[test]
    fn weights_shift_the_pool() {
        let input = [0.4, 0.6];
        let out = fit(&input, &[3.0, 1.0], Direction::Nonincreasing);
        // Weighted mean (0.4·3 + 0.6·1) / 4 = 0.45
        assert!((out[0] - 0.45).abs() < 1e-12);
        assert_eq!(out[0], out[1]);
    }

    #[test]
    fn nondecreasing_via_negation() {
        let input = [0.6, 0.4];
        let out = fit(&input, &unit_weights(2), Direction::Nondecreasing);
        assert!((out[0] - 0.5).abs() < 1e-12);
        assert_eq!(out[0], out[1]);
    }
}
