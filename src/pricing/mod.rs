//! # Cost Estimator
//!
//! Pure arithmetic over a per-region price table. Billed duration is rounded
//! up to the billing unit before it is multiplied out, the same way the
//! compute substrate bills it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::PricingConfig;
use crate::error::{RenderError, RenderResult};
use crate::models::Region;

/// Prices for one region, in USD
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionPricing {
    pub price_per_gb_second: f64,
    pub price_per_request: f64,
}

const STANDARD: RegionPricing = RegionPricing {
    price_per_gb_second: 0.000_016_666_7,
    price_per_request: 0.000_000_2,
};

const BUILTIN_REGIONS: &[(&str, RegionPricing)] = &[
    ("us-east-1", STANDARD),
    ("us-east-2", STANDARD),
    ("us-west-1", STANDARD),
    ("us-west-2", STANDARD),
    ("ca-central-1", STANDARD),
    ("eu-central-1", STANDARD),
    ("eu-west-1", STANDARD),
    ("eu-west-2", STANDARD),
    ("eu-west-3", STANDARD),
    ("eu-north-1", STANDARD),
    ("ap-northeast-1", STANDARD),
    ("ap-northeast-2", STANDARD),
    ("ap-south-1", STANDARD),
    ("ap-southeast-1", STANDARD),
    ("ap-southeast-2", STANDARD),
    ("sa-east-1", STANDARD),
    (
        "eu-south-1",
        RegionPricing {
            price_per_gb_second: 0.000_019_517_2,
            price_per_request: 0.000_000_23,
        },
    ),
    (
        "af-south-1",
        RegionPricing {
            price_per_gb_second: 0.000_022_1,
            price_per_request: 0.000_000_27,
        },
    ),
    (
        "ap-east-1",
        RegionPricing {
            price_per_gb_second: 0.000_022_92,
            price_per_request: 0.000_000_28,
        },
    ),
    (
        "me-south-1",
        RegionPricing {
            price_per_gb_second: 0.000_020_666_7,
            price_per_request: 0.000_000_25,
        },
    ),
];

const DECIMAL_PLACES: i32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub compute_cost: f64,
    pub request_cost: f64,
    pub total: f64,
    pub currency: String,
    /// Average duration after rounding up to the billing unit
    pub billed_ms_per_invocation: u64,
}

#[derive(Debug, Clone)]
pub struct PricingTable {
    regions: HashMap<Region, RegionPricing>,
    billing_unit_ms: u64,
}

impl PricingTable {
    /// Built-in region prices
    pub fn builtin(config: &PricingConfig) -> Self {
        let regions = BUILTIN_REGIONS
            .iter()
            .map(|(name, pricing)| (Region::new(*name), *pricing))
            .collect();
        Self {
            regions,
            billing_unit_ms: config.billing_unit_ms.max(1),
        }
    }

    pub fn with_region(mut self, region: impl Into<Region>, pricing: RegionPricing) -> Self {
        self.regions.insert(region.into(), pricing);
        self
    }

    pub fn pricing_for(&self, region: &Region) -> RenderResult<RegionPricing> {
        self.regions
            .get(region)
            .copied()
            .ok_or_else(|| RenderError::invalid_spec(format!("no pricing for region {region}")))
    }

    /// Estimate the cost of `invocations` worker calls averaging
    /// `avg_duration_ms` at `memory_mb`.
    pub fn estimate(
        &self,
        invocations: u64,
        memory_mb: u32,
        avg_duration_ms: u64,
        region: &Region,
    ) -> RenderResult<CostEstimate> {
        let pricing = self.pricing_for(region)?;
        let billed_ms = avg_duration_ms.div_ceil(self.billing_unit_ms) * self.billing_unit_ms;

        let gb_seconds =
            (memory_mb as f64 / 1024.0) * (billed_ms as f64 / 1000.0) * invocations as f64;
        let compute_cost = round(gb_seconds * pricing.price_per_gb_second);
        let request_cost = round(invocations as f64 * pricing.price_per_request);

        Ok(CostEstimate {
            compute_cost,
            request_cost,
            total: round(compute_cost + request_cost),
            currency: "USD".to_string(),
            billed_ms_per_invocation: billed_ms,
        })
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin(&PricingConfig::default())
    }
}

fn round(value: f64) -> f64 {
    let factor = 10f64.powi(DECIMAL_PLACES);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_region_estimate() {
        let table = PricingTable::default();
        // 100 invocations * 2 GB * 10 s = 2000 GB-s
        let estimate = table
            .estimate(100, 2048, 10_000, &Region::new("us-east-1"))
            .unwrap();
        assert_eq!(estimate.compute_cost, 0.03333);
        assert_eq!(estimate.request_cost, 0.00002);
        assert_eq!(estimate.total, 0.03335);
        assert_eq!(estimate.currency, "USD");
    }

    #[test]
    fn test_duration_rounds_up_to_billing_unit() {
        let table = PricingTable::builtin(&PricingConfig {
            billing_unit_ms: 100,
        });
        let estimate = table.estimate(1, 1024, 101, &Region::new("eu-west-1")).unwrap();
        assert_eq!(estimate.billed_ms_per_invocation, 200);
    }

    #[test]
    fn test_zero_invocations_cost_nothing() {
        let estimate = PricingTable::default()
            .estimate(0, 2048, 5_000, &Region::new("us-west-2"))
            .unwrap();
        assert_eq!(estimate.total, 0.0);
    }

    #[test]
    fn test_unknown_region_rejected() {
        let err = PricingTable::default()
            .estimate(1, 1024, 1, &Region::new("mars-north-1"))
            .unwrap_err();
        assert!(matches!(err, RenderError::InvalidSpec(_)));
    }

    #[test]
    fn test_custom_region() {
        let table = PricingTable::default().with_region(
            "local",
            RegionPricing {
                price_per_gb_second: 1.0,
                price_per_request: 0.0,
            },
        );
        let estimate = table.estimate(1, 1024, 1_000, &Region::new("local")).unwrap();
        assert_eq!(estimate.total, 1.0);
    }
}
