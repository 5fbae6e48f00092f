// Well-known keys and enumeration values.

pub const POWER_STATE: &str = "BSH.Common.Setting.PowerState";
pub const CHILD_LOCK: &str = "BSH.Common.Setting.ChildLock";

pub const OPERATION_STATE: &str = "BSH.Common.Status.OperationState";
pub const REMOTE_CONTROL_ACTIVE: &str = "BSH.Common.Status.RemoteControlActive";
pub const REMOTE_CONTROL_START_ALLOWED: &str = "BSH.Common.Status.RemoteControlStartAllowed";
pub const BATTERY_LEVEL: &str = "BSH.Common.Status.BatteryLevel";
pub const BATTERY_CHARGING_STATE: &str = "BSH.Common.Status.BatteryChargingState";

pub const REMAINING_PROGRAM_TIME: &str = "BSH.Common.Option.RemainingProgramTime";
pub const ELAPSED_PROGRAM_TIME: &str = "BSH.Common.Option.ElapsedProgramTime";
pub const PROGRAM_PROGRESS: &str = "BSH.Common.Option.ProgramProgress";

pub const POWER_ON: &str = "BSH.Common.EnumType.PowerState.On";
pub const POWER_OFF: &str = "BSH.Common.EnumType.PowerState.Off";
pub const POWER_STANDBY: &str = "BSH.Common.EnumType.PowerState.Standby";

/// `OperationState` suffixes during which a program is active.
pub const ACTIVE_OPERATION_STATES: &[&str] =
    &["DelayedStart", "Run", "Pause", "ActionRequired", "Finished"];

/// Discrete event states (`BSH.Common.EnumType.EventPresentState.*`).
pub const EVENT_PRESENT: &str = "Present";
pub const EVENT_CONFIRMED: &str = "Confirmed";
pub const EVENT_OFF: &str = "Off";
