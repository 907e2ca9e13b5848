mod fixtures;

pub(crate) use fixtures::*;

mod combination_scenario_tests;
mod event_source_tests;
mod flattening_scenario_tests;
mod multicast_scenario_tests;
mod runtime_tests;
