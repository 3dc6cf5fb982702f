pub mod configuration;
pub mod controller;
pub mod logger;
pub mod runahead;
pub mod scheduler;
pub mod sim_stats;
pub mod support;
pub mod work;
pub mod worker;
