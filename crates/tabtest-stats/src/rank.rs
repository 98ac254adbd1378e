//! Mid-ranks and tie bookkeeping shared by the rank tests.

/// Average (mid-)ranks of `values`, aligned with the input order.
///
/// Returns the ranks together with the size of every tie group, in sorted
/// order, so callers can apply tie corrections.
pub fn average_ranks(values: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut ties = Vec::new();
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end hold ranks start+1..=end
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        ties.push(end - start);
        start = end;
    }
    (ranks, ties)
}

/// `sum(t^3 - t)` over tie groups.
pub fn tie_sum(ties: &[usize]) -> f64 {
    ties.iter()
        .map(|&t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum()
}

/// Whether any tie group has more than one member.
pub fn has_ties(ties: &[usize]) -> bool {
    ties.iter().any(|&t| t > 1)
}
