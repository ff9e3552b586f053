pub mod ads;
pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod dates;
pub mod error;
pub mod finance;
pub mod layout;
pub mod model;
pub mod plan;
pub mod purchases;
pub mod render;
pub mod retry;
pub mod routes;
pub mod state;
pub mod theme;

use std::ffi::OsString;
use std::io::{self, Write};

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting shukin");
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.rc_file.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let store = datastore::DataStore::open(&data_dir)
        .with_context(|| format!("failed to open datastore at {}", data_dir.display()))?;

    let clock = commands::Clock::system(cfg.timezone());
    let mut state = state::AppState::load(store, clock.now).context("failed to load saved data")?;
    let renderer = render::Renderer::new(&cfg, state.theme())?;

    let command = cli.command.unwrap_or(cli::Command::List);
    let mut out = io::stdout().lock();
    commands::dispatch(&mut state, &cfg, &renderer, &clock, command, &mut out)?;
    out.flush()?;

    info!("done");
    Ok(())
}
