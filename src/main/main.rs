use anyhow::Context;
use clap::Parser;

use umbra::core::configuration::{CliOptions, ConfigFileOptions, ConfigOptions};
use umbra::core::controller::Controller;
use umbra::core::logger;

fn main() -> anyhow::Result<()> {
    let cli = CliOptions::parse();
    let show_config = cli.show_config;

    let file_options = match &cli.config {
        Some(path) => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Failed to open config file '{path}'"))?;
            serde_yaml::from_reader(file)
                .with_context(|| format!("Failed to parse config file '{path}'"))?
        }
        None => ConfigFileOptions::default(),
    };

    let config = ConfigOptions::new(file_options, cli);

    if show_config {
        println!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    logger::init(config.log_level()).expect("Failed to initialize the logger");

    let controller = Controller::new(&config)?;

    // finish the current round and exit cleanly on ctrl-c
    signal_hook::flag::register(signal_hook::consts::SIGINT, controller.stop_flag())
        .context("Failed to register the signal handler")?;

    controller.run()?;

    Ok(())
}
