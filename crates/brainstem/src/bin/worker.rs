//! Distributed job worker: polls the durable job queue and executes claimed
//! jobs via the wired `Brainstem` instance. Requires `jobs.backend = sqlite`
//! for cross-process sharing.
#![allow(clippy::print_stdout)] // CLI binary — stdout is the UI

use std::sync::atomic::AtomicBool;

use anyhow::Context;
use brainstem::Brainstem;
use brainstem_core::{Config, JobBackend};

struct Args {
    once: bool,
    poll_interval: Option<f64>,
    config_path: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut once = false;
    let mut poll_interval = None;
    let mut config_path = None;

    let mut raw = std::env::args().skip(1);
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--once" => once = true,
            "--poll-interval" => {
                let value = raw.next().context("--poll-interval requires a value")?;
                poll_interval = Some(value.parse::<f64>().context("--poll-interval must be a number")?);
            }
            "--config" => {
                config_path = Some(raw.next().context("--config requires a value")?);
            }
            other => anyhow::bail!("unrecognized argument: {other}"),
        }
    }

    Ok(Args { once, poll_interval, config_path })
}

fn main() -> anyhow::Result<()> {
    let args = parse_args()?;
    let _guard = brainstem::tracing_setup::init(true);

    let config_path = Config::find_config_path(args.config_path.as_deref());
    let mut config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        Config::default()
    };
    if let Some(poll_interval) = args.poll_interval {
        config.jobs.poll_interval_s = poll_interval;
    }

    anyhow::ensure!(
        matches!(config.jobs.backend, JobBackend::Sqlite),
        "worker process requires jobs.backend = sqlite for shared queue mode"
    );

    let brainstem = Brainstem::new(&config)?;
    let manager = brainstem.jobs();

    if args.once {
        let processed = manager.process_next()?;
        println!("{}", if processed { "processed" } else { "idle" });
        return Ok(());
    }

    let stop = AtomicBool::new(false);
    manager.run_forever(&stop);
    Ok(())
}
