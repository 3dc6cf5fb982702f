//! Simulation options, taken from a yaml config file with command-line
//! overrides layered on top.

use clap::{Parser, ValueEnum};
use merge::Merge;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::scheduler::policy::PolicyKind;
use crate::core::support::simulation_time::SimulationTime;
use crate::core::support::units::Time;
use crate::network::router::CoDelParams;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "umbra",
    version,
    about = "Umbra: a parallel discrete-event network simulator"
)]
pub struct CliOptions {
    /// Path to the simulation config file (yaml)
    pub config: Option<String>,

    /// Print the merged configuration and exit
    #[arg(long)]
    pub show_config: bool,

    #[command(flatten)]
    pub general: GeneralOptions,

    #[command(flatten)]
    pub network: NetworkOptions,

    #[command(flatten)]
    pub codel: CodelOptions,
}

/// Options from a config file. Every section is optional; the command line
/// wins where both are given.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFileOptions {
    pub general: GeneralOptions,
    pub network: NetworkOptions,
    pub codel: CodelOptions,
    pub hosts: Vec<HostOptions>,
}

#[derive(Debug, Clone, Default, Parser, Serialize, Deserialize, Merge, JsonSchema)]
#[command(next_help_heading = "General (override config file options)")]
#[serde(default, deny_unknown_fields)]
pub struct GeneralOptions {
    /// How long to simulate before stopping, e.g. '10s'
    #[arg(long, value_name = "time")]
    #[schemars(with = "Option<String>")]
    pub stop_time: Option<Time>,

    /// Seed for the root RNG; everything else derives from it
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Number of worker threads
    #[arg(long, short = 'p', value_name = "workers")]
    pub parallelism: Option<u32>,

    /// How hosts are mapped to event queues and workers
    #[arg(long, value_enum, value_name = "policy")]
    pub scheduler_policy: Option<PolicyKind>,

    /// Log level
    #[arg(long, short = 'l', value_enum, value_name = "level")]
    pub log_level: Option<LogLevel>,

    /// Directory to write the stats file into
    #[arg(long, short = 'd', value_name = "path")]
    pub data_directory: Option<String>,
}

#[derive(Debug, Clone, Default, Parser, Serialize, Deserialize, Merge, JsonSchema)]
#[command(next_help_heading = "Network (override config file options)")]
#[serde(default, deny_unknown_fields)]
pub struct NetworkOptions {
    /// Latency between hosts unless a link overrides it, e.g. '10ms'
    #[arg(long, value_name = "time")]
    #[schemars(with = "Option<String>")]
    pub latency: Option<Time>,

    /// Probability in [0,1] that a packet arrives, unless a link overrides
    /// it
    #[arg(long, value_name = "p")]
    pub reliability: Option<f32>,

    /// Lower bound for the scheduler's lookahead, e.g. '1ms'
    #[arg(long, value_name = "time")]
    #[schemars(with = "Option<String>")]
    pub runahead: Option<Time>,

    /// Tighten the lookahead to the lowest path latency actually used
    #[arg(long, value_name = "bool")]
    pub use_dynamic_runahead: Option<bool>,

    /// Per-pair path overrides (config file only)
    #[arg(skip)]
    pub links: Option<Vec<LinkOptions>>,
}

#[derive(Debug, Clone, Default, Parser, Serialize, Deserialize, Merge, JsonSchema)]
#[command(next_help_heading = "Router AQM (override config file options)")]
#[serde(default, deny_unknown_fields)]
pub struct CodelOptions {
    /// Hard cap on packets a router queue stores
    #[arg(long = "codel-limit", value_name = "packets")]
    pub limit: Option<usize>,

    /// Standing queue delay goal, e.g. '5ms'
    #[arg(long = "codel-target", value_name = "time")]
    #[schemars(with = "Option<String>")]
    pub target: Option<Time>,

    /// Window for the standing-delay estimate, e.g. '100ms'
    #[arg(long = "codel-interval", value_name = "time")]
    #[schemars(with = "Option<String>")]
    pub interval: Option<Time>,
}

/// One simulated host.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct HostOptions {
    pub name: String,

    /// Pin the host to this worker; assigned round-robin when absent.
    #[serde(default)]
    pub worker: Option<u32>,

    /// A message workload this host generates.
    #[serde(default)]
    pub messages: Option<MessageOptions>,
}

/// A fixed stream of packets from one host to a peer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MessageOptions {
    /// Name of the destination host.
    pub to: String,

    /// How many packets to send.
    pub count: u64,

    /// Gap between consecutive packets.
    #[schemars(with = "String")]
    pub interval: Time,

    /// Payload bytes per packet.
    #[serde(default)]
    pub payload: Option<usize>,

    /// When the first packet leaves, relative to the simulation start.
    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub start_time: Option<Time>,
}

/// A directed (or, by default, symmetric) path override between two hosts.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct LinkOptions {
    pub src: String,
    pub dst: String,

    #[serde(default)]
    #[schemars(with = "Option<String>")]
    pub latency: Option<Time>,

    #[serde(default)]
    pub reliability: Option<f32>,

    /// Apply the override in both directions (the default).
    #[serde(default)]
    pub bidirectional: Option<bool>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// The fully merged configuration: command-line options over file options,
/// with defaults applied by the accessors.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigOptions {
    pub general: GeneralOptions,
    pub network: NetworkOptions,
    pub codel: CodelOptions,
    pub hosts: Vec<HostOptions>,
}

impl ConfigOptions {
    pub fn new(file: ConfigFileOptions, cli: CliOptions) -> Self {
        // the command line takes precedence
        let mut general = cli.general;
        general.merge(file.general);

        let mut network = cli.network;
        network.merge(file.network);

        let mut codel = cli.codel;
        codel.merge(file.codel);

        Self {
            general,
            network,
            codel,
            hosts: file.hosts,
        }
    }

    pub fn stop_time(&self) -> Option<SimulationTime> {
        self.general.stop_time.map(|t| t.interval())
    }

    pub fn seed(&self) -> u64 {
        self.general.seed.unwrap_or(1)
    }

    pub fn parallelism(&self) -> u32 {
        self.general.parallelism.unwrap_or(1)
    }

    pub fn scheduler_policy(&self) -> PolicyKind {
        self.general.scheduler_policy.unwrap_or(PolicyKind::HostSingle)
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.general
            .log_level
            .map(Into::into)
            .unwrap_or(log::LevelFilter::Info)
    }

    pub fn data_directory(&self) -> Option<&str> {
        self.general.data_directory.as_deref()
    }

    pub fn latency(&self) -> SimulationTime {
        self.network
            .latency
            .map(|t| t.interval())
            .unwrap_or(SimulationTime::from_millis(10))
    }

    pub fn reliability(&self) -> f32 {
        self.network.reliability.unwrap_or(1.0)
    }

    pub fn runahead(&self) -> Option<SimulationTime> {
        self.network.runahead.map(|t| t.interval())
    }

    pub fn use_dynamic_runahead(&self) -> bool {
        self.network.use_dynamic_runahead.unwrap_or(false)
    }

    pub fn links(&self) -> &[LinkOptions] {
        self.network.links.as_deref().unwrap_or(&[])
    }

    pub fn codel_params(&self) -> CoDelParams {
        let defaults = CoDelParams::default();
        CoDelParams {
            limit: self.codel.limit.unwrap_or(defaults.limit),
            target: self
                .codel
                .target
                .map(|t| t.interval())
                .unwrap_or(defaults.target),
            interval: self
                .codel
                .interval
                .map(|t| t.interval())
                .unwrap_or(defaults.interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliOptions {
        CliOptions::parse_from(std::iter::once("umbra").chain(args.iter().copied()))
    }

    #[test]
    fn test_file_parse() {
        let yaml = "
general:
  stop_time: 10s
  seed: 42
network:
  latency: 2ms
hosts:
  - name: alice
    messages:
      to: bob
      count: 100
      interval: 10ms
  - name: bob
";
        let file: ConfigFileOptions = serde_yaml::from_str(yaml).unwrap();
        let config = ConfigOptions::new(file, cli(&[]));

        assert_eq!(config.stop_time(), Some(SimulationTime::from_secs(10)));
        assert_eq!(config.seed(), 42);
        assert_eq!(config.latency(), SimulationTime::from_millis(2));
        assert_eq!(config.hosts.len(), 2);
        assert_eq!(config.hosts[0].messages.as_ref().unwrap().count, 100);
    }

    #[test]
    fn test_cli_overrides_file() {
        let yaml = "
general:
  seed: 42
  parallelism: 2
";
        let file: ConfigFileOptions = serde_yaml::from_str(yaml).unwrap();
        let config = ConfigOptions::new(file, cli(&["--seed", "7"]));

        // the cli seed wins, the file parallelism survives
        assert_eq!(config.seed(), 7);
        assert_eq!(config.parallelism(), 2);
    }

    #[test]
    fn test_defaults() {
        let config = ConfigOptions::new(ConfigFileOptions::default(), cli(&[]));

        assert_eq!(config.stop_time(), None);
        assert_eq!(config.seed(), 1);
        assert_eq!(config.parallelism(), 1);
        assert_eq!(config.scheduler_policy(), PolicyKind::HostSingle);
        assert_eq!(config.reliability(), 1.0);
        assert!(!config.use_dynamic_runahead());
        assert_eq!(config.codel_params().limit, 1000);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "
general:
  stop_tiem: 10s
";
        assert!(serde_yaml::from_str::<ConfigFileOptions>(yaml).is_err());
    }
}
