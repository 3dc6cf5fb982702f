pub mod emulated_time;
pub mod simulation_time;
pub mod units;
