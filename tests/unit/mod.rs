mod durability_tests;
mod scenario_tests;
