//! Division of a total desired size among prioritized children.

use fleet_core::{PoolError, PoolResult};

/// Divide `total` among children according to `priorities` (percentages
/// that must sum to exactly 100).
///
/// Children are considered in descending priority order, ties broken by
/// configuration order. Each child is assigned
/// `min(ceil(total * priority / 100), remainder)`, so the shares always sum
/// to exactly `total` and rounding bias favors higher-priority children.
/// Returned shares are in configuration order.
pub fn calculate_distribution(total: u64, priorities: &[u32]) -> PoolResult<Vec<u64>> {
    if priorities.is_empty() {
        return Err(PoolError::InvalidArgument(
            "cannot distribute over zero children".to_string(),
        ));
    }
    let sum: u64 = priorities.iter().map(|p| *p as u64).sum();
    if sum != 100 {
        return Err(PoolError::InvalidArgument(format!(
            "child priorities must sum to 100, got {sum}"
        )));
    }

    let mut order: Vec<usize> = (0..priorities.len()).collect();
    // Stable sort keeps configuration order among equal priorities.
    order.sort_by_key(|&i| std::cmp::Reverse(priorities[i]));

    let mut shares = vec![0u64; priorities.len()];
    let mut remainder = total;
    for &i in &order {
        let ceiled = (total as u128 * priorities[i] as u128).div_ceil(100) as u64;
        let assigned = ceiled.min(remainder);
        shares[i] = assigned;
        remainder -= assigned;
    }
    Ok(shares)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_split() {
        assert_eq!(calculate_distribution(30, &[50, 50]).unwrap(), vec![15, 15]);
    }

    #[test]
    fn weighted_split() {
        assert_eq!(calculate_distribution(10, &[70, 30]).unwrap(), vec![7, 3]);
    }

    #[test]
    fn rounding_favors_earlier_child_on_equal_priority() {
        // 31 * 50% rounds up to 16 for the first child; the second gets
        // whatever remains.
        assert_eq!(calculate_distribution(31, &[50, 50]).unwrap(), vec![16, 15]);
    }

    #[test]
    fn rounding_favors_higher_priority() {
        // ceil(10 * 34%) = 4, ceil(10 * 33%) = 4, remainder 2.
        assert_eq!(
            calculate_distribution(10, &[34, 33, 33]).unwrap(),
            vec![4, 4, 2]
        );
    }

    #[test]
    fn shares_always_sum_to_total() {
        let cases: &[(u64, &[u32])] = &[
            (0, &[100]),
            (1, &[50, 50]),
            (7, &[60, 25, 15]),
            (97, &[34, 33, 33]),
            (1000, &[1, 99]),
        ];
        for (total, priorities) in cases {
            let shares = calculate_distribution(*total, priorities).unwrap();
            assert_eq!(shares.iter().sum::<u64>(), *total, "total {total}");
        }
    }

    #[test]
    fn zero_total_gives_zero_shares() {
        assert_eq!(
            calculate_distribution(0, &[70, 30]).unwrap(),
            vec![0, 0]
        );
    }

    #[test]
    fn priorities_must_sum_to_one_hundred() {
        assert!(matches!(
            calculate_distribution(10, &[60, 30]),
            Err(PoolError::InvalidArgument(_))
        ));
        assert!(matches!(
            calculate_distribution(10, &[60, 50]),
            Err(PoolError::InvalidArgument(_))
        ));
    }

    #[test]
    fn no_children_is_rejected() {
        assert!(matches!(
            calculate_distribution(10, &[]),
            Err(PoolError::InvalidArgument(_))
        ));
    }
}
