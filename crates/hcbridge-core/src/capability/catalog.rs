// ── Appliance catalogue ──
//
// Which modules each appliance family gets, in dependency order.

use super::CompositionHost;
use super::modules::{
    ActiveProgramModule, EventsModule, IndicatorModule, ModeSwitchModule, PowerModule,
    RemainingTimeModule,
};
use crate::model::ApplianceType;

const PROGRAM_FINISHED: (&str, &str) = ("BSH.Common.Event.ProgramFinished", "Program Finished");
const PROGRAM_ABORTED: (&str, &str) = ("BSH.Common.Event.ProgramAborted", "Program Aborted");
const ALARM_CLOCK: (&str, &str) = ("BSH.Common.Event.AlarmClockElapsed", "Timer Finished");

const DISHWASHER_EVENTS: &[(&str, &str)] = &[
    PROGRAM_FINISHED,
    PROGRAM_ABORTED,
    ("Dishcare.Dishwasher.Event.SaltNearlyEmpty", "Salt Low"),
    ("Dishcare.Dishwasher.Event.RinseAidNearlyEmpty", "Rinse Aid Low"),
];

const LAUNDRY_EVENTS: &[(&str, &str)] = &[
    PROGRAM_FINISHED,
    PROGRAM_ABORTED,
    ("LaundryCare.Washer.Event.IDos1FillLevelPoor", "i-Dos 1 Low"),
    ("LaundryCare.Washer.Event.IDos2FillLevelPoor", "i-Dos 2 Low"),
];

const DRYER_EVENTS: &[(&str, &str)] = &[
    PROGRAM_FINISHED,
    PROGRAM_ABORTED,
    ("LaundryCare.Dryer.Event.DryingProcessFinished", "Drying Finished"),
];

const OVEN_EVENTS: &[(&str, &str)] = &[
    PROGRAM_FINISHED,
    PROGRAM_ABORTED,
    ALARM_CLOCK,
    ("Cooking.Oven.Event.PreheatFinished", "Preheat Finished"),
];

const HOB_EVENTS: &[(&str, &str)] = &[PROGRAM_FINISHED, ALARM_CLOCK];

const HOOD_EVENTS: &[(&str, &str)] = &[
    PROGRAM_FINISHED,
    ("Cooking.Common.Event.Hood.GreaseFilterMaxSaturationNearlyReached", "Grease Filter"),
];

const COFFEE_EVENTS: &[(&str, &str)] = &[
    PROGRAM_FINISHED,
    ("ConsumerProducts.CoffeeMaker.Event.BeanContainerEmpty", "Beans Empty"),
    ("ConsumerProducts.CoffeeMaker.Event.WaterTankEmpty", "Water Tank Empty"),
    ("ConsumerProducts.CoffeeMaker.Event.DripTrayFull", "Drip Tray Full"),
];

const ROBOT_EVENTS: &[(&str, &str)] = &[
    PROGRAM_FINISHED,
    PROGRAM_ABORTED,
    ("ConsumerProducts.CleaningRobot.Event.EmptyDustBoxAndCleanFilter", "Dust Box Full"),
    ("ConsumerProducts.CleaningRobot.Event.RobotIsStuck", "Robot Stuck"),
];

const FRIDGE_EVENTS: &[(&str, &str)] = &[
    ("Refrigeration.FridgeFreezer.Event.DoorAlarmFreezer", "Freezer Door"),
    ("Refrigeration.FridgeFreezer.Event.DoorAlarmRefrigerator", "Fridge Door"),
    ("Refrigeration.FridgeFreezer.Event.TemperatureAlarmFreezer", "Freezer Temperature"),
];

const SUPER_FREEZE: (&str, &str) = (
    "Refrigeration.FridgeFreezer.Setting.SuperModeFreezer",
    "Super Freeze",
);
const SUPER_COOL: (&str, &str) = (
    "Refrigeration.FridgeFreezer.Setting.SuperModeRefrigerator",
    "Super Cool",
);
const FRIDGE_SABBATH: (&str, &str) = ("Refrigeration.Common.Setting.SabbathMode", "Sabbath Mode");
const VACATION: (&str, &str) = ("Refrigeration.Common.Setting.VacationMode", "Vacation Mode");
const OVEN_SABBATH: (&str, &str) = ("Cooking.Oven.Setting.SabbathMode", "Sabbath Mode");
const HOOD_LIGHT: (&str, &str) = ("Cooking.Common.Setting.Lighting", "Light");
const CUP_WARMER: (&str, &str) = ("ConsumerProducts.CoffeeMaker.Setting.CupWarmer", "Cup Warmer");

/// What a family supports, independent of module order.
struct Family {
    power: bool,
    programs: bool,
    remote_control: bool,
    battery: bool,
    child_lock: bool,
    modes: &'static [(&'static str, &'static str)],
    events: &'static [(&'static str, &'static str)],
}

impl Family {
    const PROGRAMMABLE: Self = Self {
        power: true,
        programs: true,
        remote_control: true,
        battery: false,
        child_lock: true,
        modes: &[],
        events: &[PROGRAM_FINISHED, PROGRAM_ABORTED],
    };

    const COOLING: Self = Self {
        power: false,
        programs: false,
        remote_control: false,
        battery: false,
        child_lock: false,
        modes: &[],
        events: FRIDGE_EVENTS,
    };
}

fn family(appliance_type: &ApplianceType) -> Family {
    use ApplianceType as T;
    match appliance_type {
        T::Dishwasher => Family {
            events: DISHWASHER_EVENTS,
            ..Family::PROGRAMMABLE
        },
        T::Washer | T::WasherDryer => Family {
            events: LAUNDRY_EVENTS,
            ..Family::PROGRAMMABLE
        },
        T::Dryer => Family {
            events: DRYER_EVENTS,
            ..Family::PROGRAMMABLE
        },
        T::Oven => Family {
            modes: &[OVEN_SABBATH],
            events: OVEN_EVENTS,
            ..Family::PROGRAMMABLE
        },
        T::Hob => Family {
            events: HOB_EVENTS,
            ..Family::PROGRAMMABLE
        },
        T::Hood => Family {
            child_lock: false,
            modes: &[HOOD_LIGHT],
            events: HOOD_EVENTS,
            ..Family::PROGRAMMABLE
        },
        T::CoffeeMaker => Family {
            modes: &[CUP_WARMER],
            events: COFFEE_EVENTS,
            ..Family::PROGRAMMABLE
        },
        T::CleaningRobot => Family {
            battery: true,
            child_lock: false,
            events: ROBOT_EVENTS,
            ..Family::PROGRAMMABLE
        },
        T::CookProcessor | T::WarmingDrawer => Family {
            child_lock: false,
            ..Family::PROGRAMMABLE
        },
        T::FridgeFreezer => Family {
            child_lock: true,
            modes: &[SUPER_FREEZE, SUPER_COOL, FRIDGE_SABBATH, VACATION],
            ..Family::COOLING
        },
        T::Refrigerator => Family {
            modes: &[SUPER_COOL, FRIDGE_SABBATH, VACATION],
            ..Family::COOLING
        },
        T::Freezer => Family {
            modes: &[SUPER_FREEZE, FRIDGE_SABBATH],
            ..Family::COOLING
        },
        T::WineCooler => Family {
            modes: &[FRIDGE_SABBATH],
            events: &[],
            ..Family::COOLING
        },
        T::Other(_) => Family {
            child_lock: false,
            ..Family::PROGRAMMABLE
        },
    }
}

/// Modules for one appliance family, ordered so every requirement is
/// provided by an earlier module.
pub fn modules_for(appliance_type: &ApplianceType) -> CompositionHost {
    let family = family(appliance_type);
    let mut host = CompositionHost::new();

    if family.power {
        host = host.with(PowerModule::new());
        if family.programs {
            host = host
                .with(ActiveProgramModule::new())
                .with(RemainingTimeModule::new());
        }
    }
    if family.battery {
        host = host.with(IndicatorModule::battery());
    }
    if family.remote_control {
        host = host.with(IndicatorModule::remote_control());
    }
    if family.child_lock {
        host = host.with(ModeSwitchModule::child_lock());
    }
    for (key, name) in family.modes {
        host = host.with(ModeSwitchModule::setting(*key, *name));
    }
    if !family.events.is_empty() {
        host = host.with(EventsModule::new(family.events.to_vec()));
    }
    host
}
