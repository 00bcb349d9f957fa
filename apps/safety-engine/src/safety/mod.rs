//! Shared safety state: kill switches and daily counters.

mod counters;
mod kill_switch;

pub use counters::DailyCounters;
pub use kill_switch::{KillSwitchManager, KillSwitchScope, SwitchRecord};
