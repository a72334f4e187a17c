// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use anyhow::Error;
use config::Config;
use engine::Engine;
use montage_pg::PgController;
use simplelog::{Config as LogConfig, LevelFilter, TermLogger, TerminalMode};

fn main() -> Result<(), Error> {
    TermLogger::init(LevelFilter::Info, LogConfig::default(), TerminalMode::Mixed)?;

    let config = Config::load_or_default(config::DEFAULT_CONFIG_PATH)?;
    let controller = PgController::from_config(&config)?;
    controller.run_migrations()?;

    let engine = Engine::with_config(&controller, &config);
    let report = engine.recompute_all(config.maintenance.chunk_size)?;

    println!("{}", report);
    Ok(())
}
