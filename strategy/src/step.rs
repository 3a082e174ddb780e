use anyhow::{bail, Result};
use common::price::{decimal_places, round_to};

/// Settings for a fixed-interval grid: the operator's price range plus the
/// exchange limits it has to fit inside.
#[derive(Clone, Debug)]
pub struct FixedIntervalConfig {
    pub min: f64,
    pub max: f64,
    pub interval: f64,
    pub min_price_allowed: f64,
    pub max_price_allowed: f64,
    pub price_tick: f64,
}

/// Pure generator of the descending price ladder `max, max-i, max-2i, ...`
/// truncated at `min`, every level rounded to the exchange price tick.
#[derive(Clone, Debug)]
pub struct FixedIntervalSteps {
    min: f64,
    max: f64,
    interval: f64,
    precision: u32,
}

impl FixedIntervalSteps {
    pub fn new(cfg: FixedIntervalConfig) -> Result<Self> {
        if cfg.min < cfg.min_price_allowed {
            bail!(
                "min price {} below exchange minimum {}",
                cfg.min,
                cfg.min_price_allowed
            );
        }
        if cfg.max > cfg.max_price_allowed {
            bail!(
                "max price {} above exchange maximum {}",
                cfg.max,
                cfg.max_price_allowed
            );
        }
        if cfg.max < cfg.min {
            bail!("max price {} below min price {}", cfg.max, cfg.min);
        }
        if cfg.interval <= 0.0 {
            bail!("grid interval must be positive, got {}", cfg.interval);
        }
        Ok(FixedIntervalSteps {
            min: cfg.min,
            max: cfg.max,
            interval: cfg.interval,
            precision: decimal_places(cfg.price_tick),
        })
    }

    pub fn steps(&self) -> Vec<f64> {
        let mut steps = Vec::new();
        let mut level = round_to(self.max, self.precision);
        while level >= self.min {
            steps.push(level);
            level = round_to(level - self.interval, self.precision);
        }
        steps
    }

    /// The sell level paired with a buy step.
    pub fn close_price(&self, step: f64) -> f64 {
        round_to(step + self.interval, self.precision)
    }
}

/// Step generator variants; one kind today, the enum keeps the dispatch
/// closed and the call sites stable.
#[derive(Clone, Debug)]
pub enum Stepper {
    FixedInterval(FixedIntervalSteps),
}

impl Stepper {
    pub fn steps(&self) -> Vec<f64> {
        match self {
            Stepper::FixedInterval(fixed) => fixed.steps(),
        }
    }

    pub fn close_price(&self, step: f64) -> f64 {
        match self {
            Stepper::FixedInterval(fixed) => fixed.close_price(step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min: f64, max: f64, interval: f64) -> FixedIntervalConfig {
        FixedIntervalConfig {
            min,
            max,
            interval,
            min_price_allowed: 0.01,
            max_price_allowed: 1_000_000.0,
            price_tick: 0.01,
        }
    }

    #[test]
    fn descending_ladder_truncated_at_min() {
        let stepper = FixedIntervalSteps::new(config(20000.0, 20250.0, 100.0)).unwrap();
        assert_eq!(stepper.steps(), vec![20250.0, 20150.0, 20050.0]);
    }

    #[test]
    fn single_step_when_min_equals_max() {
        let stepper = FixedIntervalSteps::new(config(20000.0, 20000.0, 100.0)).unwrap();
        assert_eq!(stepper.steps(), vec![20000.0]);
        assert_eq!(stepper.close_price(20000.0), 20100.0);
    }

    #[test]
    fn levels_are_rounded_to_tick() {
        let stepper = FixedIntervalSteps::new(config(0.05, 0.2, 0.033)).unwrap();
        for level in stepper.steps() {
            let rounded = common::price::round_to(level, 2);
            assert!((level - rounded).abs() < 1e-12, "level {level} not on tick");
        }
    }

    #[test]
    fn validation_rejects_bad_ranges() {
        assert!(FixedIntervalSteps::new(config(0.001, 20000.0, 100.0)).is_err());
        assert!(FixedIntervalSteps::new(FixedIntervalConfig {
            max_price_allowed: 10_000.0,
            ..config(20000.0, 20500.0, 100.0)
        })
        .is_err());
        assert!(FixedIntervalSteps::new(config(21000.0, 20000.0, 100.0)).is_err());
        assert!(FixedIntervalSteps::new(config(20000.0, 21000.0, 0.0)).is_err());
    }
}
