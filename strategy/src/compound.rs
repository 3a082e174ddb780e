use anyhow::{bail, Result};
use common::price::{decimal_places, round_to};
use common::RangeFilter;
use store::Ledger;

/// Lot size to submit for a new trade plus the quote amount that must be
/// booked as reinvested profit alongside it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompoundedVolume {
    pub base_volume: f64,
    pub quote_reinvested: f64,
}

/// Constant sizing: the same quote volume at every step, converted to a base
/// lot at the step price.
#[derive(Clone, Debug)]
pub struct CompoundNone {
    pub initial_step_quote_volume: f64,
    pub lot: RangeFilter,
}

impl CompoundNone {
    fn volume(&self, step: f64) -> Result<CompoundedVolume> {
        let precision = decimal_places(self.lot.tick);
        let volume = round_to(self.initial_step_quote_volume / step, precision);
        if !self.lot.contains(volume) {
            bail!(
                "lot {} outside exchange bounds {} - {}",
                volume,
                self.lot.min,
                self.lot.max
            );
        }
        Ok(CompoundedVolume {
            base_volume: volume,
            quote_reinvested: 0.0,
        })
    }
}

/// Reinvesting sizing: starts from the constant lot, keeps the lot of the
/// last closed trade at the same step (reinvested volume stays with its grid
/// cell) and adds whatever net profit has not been reinvested yet.
#[derive(Clone)]
pub struct CompoundProfitPercent {
    pub app_id: i32,
    pub ledger: Ledger,
    pub initial_step_quote_volume: f64,
    pub lot: RangeFilter,
}

impl CompoundProfitPercent {
    async fn volume(&self, step: f64) -> Result<CompoundedVolume> {
        let mut total = self.initial_step_quote_volume / step;

        if let Some(closed) = self
            .ledger
            .latest_closed_trade_by_open_price(self.app_id, step)
            .await?
        {
            total = total.max(closed.base_volume);
        }

        let balance = self.ledger.latest_balance_history(self.app_id).await?;
        let available_quote = balance.available_quote();

        let precision = decimal_places(self.lot.tick);
        let mut quote_reinvested = 0.0;
        if available_quote > 0.0 {
            let base_to_add = available_quote / step;
            // profit too small to move the lot by one tick stays banked
            if round_to(base_to_add, precision) >= self.lot.tick {
                total += base_to_add;
                quote_reinvested = available_quote;
            }
        }

        if !self.lot.contains(total) {
            bail!(
                "lot {} outside exchange bounds {} - {}",
                total,
                self.lot.min,
                self.lot.max
            );
        }

        Ok(CompoundedVolume {
            base_volume: round_to(total, precision),
            quote_reinvested,
        })
    }
}

/// Sizing policy variants, mirroring `apps.compound_type`.
#[derive(Clone)]
pub enum Compounder {
    None(CompoundNone),
    ProfitPercent(CompoundProfitPercent),
}

impl Compounder {
    pub async fn volume(&self, step: f64) -> Result<CompoundedVolume> {
        match self {
            Compounder::None(inner) => inner.volume(step),
            Compounder::ProfitPercent(inner) => inner.volume(step).await,
        }
    }
}
