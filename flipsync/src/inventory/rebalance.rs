//! Rebalancing strategies and allocation math.
//!
//! Every strategy redistributes the current total across marketplaces, so
//! `sum(recommended) == sum(current)` always holds. Allocation uses largest
//! remainder rounding; ties and leftovers resolve in canonical marketplace
//! order.

use crate::marketplace::Marketplace;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceStrategy {
    PerformanceBased,
    EqualDistribution,
    DemandBased,
    ProfitOptimized,
}

impl RebalanceStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebalanceStrategy::PerformanceBased => "performance_based",
            RebalanceStrategy::EqualDistribution => "equal_distribution",
            RebalanceStrategy::DemandBased => "demand_based",
            RebalanceStrategy::ProfitOptimized => "profit_optimized",
        }
    }
}

/// A proposed redistribution of one SKU's quantity across marketplaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceRecommendation {
    pub sku: String,
    pub current_distribution: BTreeMap<Marketplace, i64>,
    pub recommended_distribution: BTreeMap<Marketplace, i64>,
    pub expected_impact: HashMap<String, f64>,
    pub confidence_score: f64,
    pub reasoning: String,
}

/// Build a recommendation for `sku` from the current distribution.
///
/// `signals` supplies per-marketplace weights for the demand and profit
/// strategies; the performance strategy reads `performance_weights`.
pub fn generate_recommendation(
    sku: &str,
    current: &BTreeMap<Marketplace, i64>,
    strategy: RebalanceStrategy,
    performance_weights: &BTreeMap<Marketplace, f64>,
    signals: Option<&BTreeMap<Marketplace, f64>>,
) -> RebalanceRecommendation {
    let total: i64 = current.values().sum();
    let marketplaces: Vec<Marketplace> = current.keys().copied().collect();

    let recommended = match strategy {
        RebalanceStrategy::EqualDistribution => equal_distribution(total, &marketplaces),
        RebalanceStrategy::PerformanceBased => {
            allocate_by_weights(total, &marketplaces, performance_weights)
        }
        RebalanceStrategy::DemandBased | RebalanceStrategy::ProfitOptimized => match signals {
            Some(weights) => allocate_by_weights(total, &marketplaces, weights),
            // Without a signal the safest recommendation is no movement.
            None => current.clone(),
        },
    };

    let moved: i64 = current
        .iter()
        .map(|(marketplace, quantity)| (recommended.get(marketplace).copied().unwrap_or(0) - quantity).abs())
        .sum::<i64>()
        / 2;
    let churn = if total > 0 {
        moved as f64 / total as f64
    } else {
        0.0
    };

    RebalanceRecommendation {
        sku: sku.to_string(),
        current_distribution: current.clone(),
        recommended_distribution: recommended,
        expected_impact: HashMap::from([
            ("units_moved".to_string(), moved as f64),
            ("churn_ratio".to_string(), churn),
        ]),
        confidence_score: match strategy {
            RebalanceStrategy::DemandBased | RebalanceStrategy::ProfitOptimized
                if signals.is_none() =>
            {
                0.5
            }
            _ => 0.85,
        },
        reasoning: format!(
            "Based on {} strategy across {} marketplaces",
            strategy.as_str(),
            current.len()
        ),
    }
}

/// Equal split; the remainder is spread one unit at a time starting from
/// the first marketplace in canonical order, so no two marketplaces differ
/// by more than one unit.
fn equal_distribution(total: i64, marketplaces: &[Marketplace]) -> BTreeMap<Marketplace, i64> {
    if marketplaces.is_empty() {
        return BTreeMap::new();
    }
    let count = marketplaces.len() as i64;
    let per_marketplace = total / count;
    let remainder = (total % count) as usize;

    let mut sorted = marketplaces.to_vec();
    sorted.sort();
    sorted
        .into_iter()
        .enumerate()
        .map(|(index, marketplace)| {
            let extra = if index < remainder { 1 } else { 0 };
            (marketplace, per_marketplace + extra)
        })
        .collect()
}

/// Largest-remainder allocation of `total` by normalized weights. Missing
/// or non-positive weight sums degrade to an equal split.
fn allocate_by_weights(
    total: i64,
    marketplaces: &[Marketplace],
    weights: &BTreeMap<Marketplace, f64>,
) -> BTreeMap<Marketplace, i64> {
    if marketplaces.is_empty() {
        return BTreeMap::new();
    }
    let weight_sum: f64 = marketplaces
        .iter()
        .map(|m| weights.get(m).copied().unwrap_or(0.0).max(0.0))
        .sum();
    if weight_sum <= 0.0 {
        return equal_distribution(total, marketplaces);
    }

    let mut sorted = marketplaces.to_vec();
    sorted.sort();

    let mut allocation: BTreeMap<Marketplace, i64> = BTreeMap::new();
    let mut remainders: Vec<(Marketplace, f64)> = Vec::with_capacity(sorted.len());
    let mut allocated = 0i64;
    for marketplace in &sorted {
        let weight = weights.get(marketplace).copied().unwrap_or(0.0).max(0.0);
        let exact = total as f64 * weight / weight_sum;
        let floor = exact.floor() as i64;
        allocation.insert(*marketplace, floor);
        allocated += floor;
        remainders.push((*marketplace, exact - floor as f64));
    }

    // Hand the leftover units to the largest fractional parts; canonical
    // order breaks ties.
    let mut leftover = total - allocated;
    remainders.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    for (marketplace, _) in remainders {
        if leftover <= 0 {
            break;
        }
        *allocation.entry(marketplace).or_insert(0) += 1;
        leftover -= 1;
    }
    allocation
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current(values: &[(Marketplace, i64)]) -> BTreeMap<Marketplace, i64> {
        values.iter().copied().collect()
    }

    #[test]
    fn equal_distribution_preserves_total_and_balance() {
        let distribution = current(&[
            (Marketplace::Ebay, 30),
            (Marketplace::Amazon, 45),
            (Marketplace::Walmart, 26),
        ]);
        let recommendation = generate_recommendation(
            "SKU-1",
            &distribution,
            RebalanceStrategy::EqualDistribution,
            &BTreeMap::new(),
            None,
        );

        let recommended = &recommendation.recommended_distribution;
        assert_eq!(recommended.values().sum::<i64>(), 101);
        let max = recommended.values().max().unwrap();
        let min = recommended.values().min().unwrap();
        assert!(max - min <= 1);
        // The extra unit lands on the first marketplace in canonical order.
        assert_eq!(recommended[&Marketplace::Ebay], 34);
    }

    #[test]
    fn performance_weights_shift_quantity() {
        let distribution = current(&[(Marketplace::Ebay, 50), (Marketplace::Amazon, 50)]);
        let weights = BTreeMap::from([(Marketplace::Ebay, 1.0), (Marketplace::Amazon, 3.0)]);
        let recommendation = generate_recommendation(
            "SKU-1",
            &distribution,
            RebalanceStrategy::PerformanceBased,
            &weights,
            None,
        );
        assert_eq!(recommendation.recommended_distribution[&Marketplace::Amazon], 75);
        assert_eq!(recommendation.recommended_distribution[&Marketplace::Ebay], 25);
        assert_eq!(
            recommendation.recommended_distribution.values().sum::<i64>(),
            100
        );
    }

    #[test]
    fn demand_strategy_without_signal_keeps_current() {
        let distribution = current(&[(Marketplace::Ebay, 10), (Marketplace::Etsy, 20)]);
        let recommendation = generate_recommendation(
            "SKU-1",
            &distribution,
            RebalanceStrategy::DemandBased,
            &BTreeMap::new(),
            None,
        );
        assert_eq!(recommendation.recommended_distribution, distribution);
        assert!(recommendation.confidence_score < 0.6);
    }

    #[test]
    fn zero_weights_fall_back_to_equal_split() {
        let distribution = current(&[(Marketplace::Ebay, 9), (Marketplace::Amazon, 0)]);
        let weights = BTreeMap::from([(Marketplace::Ebay, 0.0), (Marketplace::Amazon, 0.0)]);
        let recommendation = generate_recommendation(
            "SKU-1",
            &distribution,
            RebalanceStrategy::ProfitOptimized,
            &BTreeMap::new(),
            Some(&weights),
        );
        assert_eq!(recommendation.recommended_distribution[&Marketplace::Ebay], 5);
        assert_eq!(recommendation.recommended_distribution[&Marketplace::Amazon], 4);
    }
}
