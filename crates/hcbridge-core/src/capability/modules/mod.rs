// Capability modules. Each one owns a single concern; the catalog decides
// which ones an appliance family gets and in what order.

mod active_program;
mod events;
mod indicator;
mod mode_switch;
mod power;
mod remaining_time;

pub use active_program::{ActiveProgramModule, ProgramState};
pub use events::{EventsModule, SINGLE_PRESS};
pub use indicator::{IndicatorModule, LOW_BATTERY_PERCENT};
pub use mode_switch::ModeSwitchModule;
pub use power::PowerModule;
pub use remaining_time::{MAX_REMAINING_SECS, RemainingTimeModule, remaining_secs};
