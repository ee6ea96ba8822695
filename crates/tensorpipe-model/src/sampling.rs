use std::collections::HashSet;

use rand::Rng;
use tensorpipe_wire::SamplingParams;

/// Runs the deterministic sampling pipeline and returns the chosen token id.
///
/// Order is fixed: presence penalty, greedy short-circuit, min_p, top_p (nucleus), top_k,
/// softmax + categorical draw. Every filtering stage that doesn't apply (param at its
/// neutral value) is skipped rather than folded into the softmax, so a fully-neutral
/// `SamplingParams` samples from the exact softmax of the raw logits.
pub fn sample(
    logits: &mut [f32],
    input_ids: &[i64],
    params: &SamplingParams,
    rng: &mut impl Rng,
) -> u32 {
    apply_presence_penalty(logits, input_ids, params.presence_penalty);

    if params.temperature == 0.0 {
        return argmax(logits);
    }
    for logit in logits.iter_mut() {
        *logit /= params.temperature;
    }

    if params.min_p > 0.0 {
        apply_min_p(logits, params.min_p);
    }
    if params.top_p < 1.0 {
        apply_top_p(logits, params.top_p);
    }
    if params.top_k > 0 {
        apply_top_k(logits, params.top_k as usize);
    }

    let probs = softmax(logits);
    categorical_sample(&probs, rng)
}

fn apply_presence_penalty(logits: &mut [f32], input_ids: &[i64], penalty: f32) {
    if penalty == 0.0 {
        return;
    }
    let mut seen = HashSet::new();
    for &id in input_ids {
        if seen.insert(id) {
            if let Some(logit) = usize::try_from(id).ok().and_then(|i| logits.get_mut(i)) {
                *logit -= penalty;
            }
        }
    }
}

fn apply_min_p(logits: &mut [f32], min_p: f32) {
    let probs = softmax(logits);
    let max_p = probs.iter().cloned().fold(f32::MIN, f32::max);
    let threshold = min_p * max_p;
    for (logit, p) in logits.iter_mut().zip(probs.iter()) {
        if *p < threshold {
            *logit = f32::NEG_INFINITY;
        }
    }
}

/// Nucleus filtering. The removal mask is computed in probability-sorted order and then
/// shifted right by one slot so the single highest-probability token always survives and
/// the token that pushes cumulative probability past `top_p` is kept too (only tokens
/// strictly beyond it are dropped).
fn apply_top_p(logits: &mut [f32], top_p: f32) {
    let probs = softmax(logits);
    let mut order: Vec<usize> = (0..logits.len()).collect();
    order.sort_by(|&a, &b| {
        logits[b]
            .partial_cmp(&logits[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut remove_sorted = vec![false; order.len()];
    let mut cumulative = 0.0f32;
    for (rank, &idx) in order.iter().enumerate() {
        cumulative += probs[idx];
        remove_sorted[rank] = cumulative > top_p;
    }
    for rank in (1..remove_sorted.len()).rev() {
        remove_sorted[rank] = remove_sorted[rank - 1];
    }
    if !remove_sorted.is_empty() {
        remove_sorted[0] = false;
    }

    for (rank, &idx) in order.iter().enumerate() {
        if remove_sorted[rank] {
            logits[idx] = f32::NEG_INFINITY;
        }
    }
}

fn apply_top_k(logits: &mut [f32], top_k: usize) {
    if top_k >= logits.len() {
        return;
    }
    let mut order: Vec<usize> = (0..logits.len()).collect();
    order.sort_by(|&a, &b| {
        logits[b]
            .partial_cmp(&logits[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for &idx in &order[top_k..] {
        logits[idx] = f32::NEG_INFINITY;
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::MIN, f32::max);
    let exps: Vec<f32> = logits
        .iter()
        .map(|&l| if l.is_finite() || l == max { (l - max).exp() } else { 0.0 })
        .collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 {
        return exps;
    }
    exps.into_iter().map(|e| e / sum).collect()
}

/// Lowest index wins ties: only a strictly greater value replaces the current best.
fn argmax(logits: &[f32]) -> u32 {
    let mut best_idx = 0usize;
    let mut best_val = f32::MIN;
    for (idx, &val) in logits.iter().enumerate() {
        if val > best_val {
            best_val = val;
            best_idx = idx;
        }
    }
    best_idx as u32
}

fn categorical_sample(probs: &[f32], rng: &mut impl Rng) -> u32 {
    let draw: f32 = rng.gen_range(0.0..1.0);
    let mut cumulative = 0.0f32;
    for (idx, &p) in probs.iter().enumerate() {
        cumulative += p;
        if draw < cumulative {
            return idx as u32;
        }
    }
    // Floating point rounding can leave `draw` just past the last cumulative bucket;
    // fall back to the highest-probability token rather than panicking.
    argmax(probs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn temperature_zero_is_deterministic_argmax() {
        let mut logits = vec![0.1, 0.9, 0.3, 0.2];
        let params = SamplingParams {
            temperature: 0.0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let token = sample(&mut logits, &[], &params, &mut rng);
        assert_eq!(token, 1);
    }

    #[test]
    fn presence_penalty_lowers_repeated_token_logit() {
        let mut logits = vec![1.0, 1.0];
        let params = SamplingParams {
            temperature: 0.0,
            presence_penalty: 2.0,
            ..Default::default()
        };
        // token 0 already appears in the context, so it should lose the argmax tie.
        let token = sample(&mut logits, &[0], &params, &mut rand::thread_rng());
        assert_eq!(token, 1);
    }

    #[test]
    fn top_p_always_keeps_the_top_token() {
        let mut logits = vec![5.0, 0.0, 0.0, 0.0];
        let params = SamplingParams {
            temperature: 1.0,
            top_p: 0.01,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(7);
        // With such a low top_p only the top token should survive; sampling it repeatedly
        // must always return index 0.
        for _ in 0..20 {
            let token = sample(&mut logits.clone(), &[], &params, &mut rng);
            assert_eq!(token, 0);
        }
    }

    #[test]
    fn top_k_restricts_to_k_candidates() {
        let logits = vec![4.0, 3.0, 2.0, 1.0];
        let params = SamplingParams {
            temperature: 1.0,
            top_k: 2,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let token = sample(&mut logits.clone(), &[], &params, &mut rng);
            assert!(token == 0 || token == 1);
        }
    }

    #[test]
    fn neutral_params_sample_plain_softmax() {
        let logits = vec![1.0, 1.0, 1.0];
        let params = SamplingParams {
            temperature: 1.0,
            top_k: 0,
            top_p: 1.0,
            min_p: 0.0,
            presence_penalty: 0.0,
        };
        let mut rng = StdRng::seed_from_u64(3);
        // Uniform logits under neutral params: every token must be reachable.
        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.insert(sample(&mut logits.clone(), &[], &params, &mut rng));
        }
        assert_eq!(seen.len(), 3);
    }
}
