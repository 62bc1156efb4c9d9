//! Per-cell conversion of population counts into waste generation rates.
//!
//! The chain is a pipeline of named steps so each is testable on its own:
//! mask invalid cells, scale by the per-capita daily rate, convert days to
//! weeks, convert kilograms to tonnes. Masking must run first: invalid
//! cells become NaN and propagate through the arithmetic untouched.

use ndarray::Array2;

/// Modeled household waste generation, kg per person per day.
pub const DEFAULT_KG_PER_CAPITA_DAY: f64 = 0.79;

const DAYS_PER_WEEK: f64 = 7.0;
const KG_PER_TONNE: f64 = 1000.0;

/// Parameters of the waste model.
#[derive(Debug, Clone, Copy)]
pub struct WasteParams {
    pub kg_per_capita_day: f64,
}

impl Default for WasteParams {
    fn default() -> Self {
        Self { kg_per_capita_day: DEFAULT_KG_PER_CAPITA_DAY }
    }
}

/// Mark negative and no-data cells as NaN so aggregation skips them
/// instead of treating them as zero population.
pub fn mask_invalid(mut population: Array2<f64>, nodata: Option<f64>) -> Array2<f64> {
    population.mapv_inplace(|v| {
        let is_nodata = nodata.map_or(false, |nd| v == nd);
        if v < 0.0 || is_nodata { f64::NAN } else { v }
    });
    population
}

/// Population -> kg of waste per day.
pub fn per_capita_daily(population: Array2<f64>, kg_per_capita_day: f64) -> Array2<f64> {
    population * kg_per_capita_day
}

/// kg per day -> kg per week.
pub fn daily_to_weekly(kg_per_day: Array2<f64>) -> Array2<f64> {
    kg_per_day * DAYS_PER_WEEK
}

/// kg -> tonnes.
pub fn kg_to_tonnes(kg: Array2<f64>) -> Array2<f64> {
    kg / KG_PER_TONNE
}

/// Full chain: population counts to tonnes of waste per week per cell,
/// with invalid cells masked to NaN.
pub fn tonnes_per_week(
    population: Array2<f64>,
    nodata: Option<f64>,
    params: &WasteParams,
) -> Array2<f64> {
    kg_to_tonnes(daily_to_weekly(per_capita_daily(
        mask_invalid(population, nodata),
        params.kg_per_capita_day,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn reference_block_matches_expected_rates() {
        // 10, 20, nodata, 30 people @ 0.79 kg/day
        let pop = array![[10.0, 20.0], [-1.0, 30.0]];
        let out = tonnes_per_week(pop, Some(-1.0), &WasteParams::default());

        assert!((out[[0, 0]] - 0.0553).abs() < 1e-4);
        assert!((out[[0, 1]] - 0.1106).abs() < 1e-4);
        assert!(out[[1, 0]].is_nan());
        assert!((out[[1, 1]] - 0.1659).abs() < 1e-4);
    }

    #[test]
    fn masking_happens_before_scaling() {
        // A negative cell must come out NaN, not as a scaled negative.
        let out = tonnes_per_week(array![[-5.0]], None, &WasteParams::default());
        assert!(out[[0, 0]].is_nan());
    }

    #[test]
    fn nodata_sentinel_is_masked_even_when_positive() {
        let out = tonnes_per_week(array![[99.0, 1.0]], Some(99.0), &WasteParams::default());
        assert!(out[[0, 0]].is_nan());
        assert!(out[[0, 1]].is_finite());
    }

    #[test]
    fn transform_is_monotonic_in_valid_cells() {
        let params = WasteParams::default();
        let lo = tonnes_per_week(array![[10.0]], None, &params)[[0, 0]];
        let hi = tonnes_per_week(array![[10.1]], None, &params)[[0, 0]];
        assert!(hi > lo);
    }

    #[test]
    fn zero_population_yields_zero_not_invalid() {
        let out = tonnes_per_week(array![[0.0]], Some(-1.0), &WasteParams::default());
        assert_eq!(out[[0, 0]], 0.0);
    }
}
