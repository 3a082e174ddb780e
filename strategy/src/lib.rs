mod compound;
mod step;

pub use compound::{CompoundNone, CompoundProfitPercent, CompoundedVolume, Compounder};
pub use step::{FixedIntervalConfig, FixedIntervalSteps, Stepper};
