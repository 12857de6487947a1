//! Run command - process every target tile.

use std::path::PathBuf;

use dempipe::app::{Pipeline, RunOptions};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::common::{load_config, IndexArgs};
use crate::error::CliError;

/// Arguments for the run command.
pub struct RunArgs {
    pub config: Option<PathBuf>,
    pub index: IndexArgs,
    pub workers: Option<usize>,
    pub overwrite: bool,
    pub exit_when_done: bool,
}

/// Run the pipeline until Ctrl-C, or until done with `--exit-when-done`.
pub fn run(args: RunArgs) -> Result<(), CliError> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config = config.with_worker_count(workers);
    }
    if args.overwrite {
        config = config.with_overwrite(true);
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Interrupt received, shutting down");
        signal.cancel();
    })
    .map_err(|e| CliError::Signal(e.to_string()))?;

    let index = args.index.source()?;
    let pipeline = Pipeline::new(config, index.as_ref())?
        .with_options(RunOptions::default().with_exit_when_drained(args.exit_when_done));

    println!("dempipe v{}", dempipe::VERSION);
    println!("==============");
    println!();
    println!("Targets:  {}", pipeline.targets().len());
    println!("Workers:  {}", pipeline.context().config.worker_count);
    println!("Output:   {}", pipeline.context().config.folders.finished.display());
    println!();
    println!("Press Ctrl+C to stop.");
    println!();

    let summary = pipeline.run_blocking(shutdown)?;

    println!();
    println!("Finished products: {}", summary.products_finished());
    println!("Tasks completed:   {}", summary.completed);
    println!("Tasks failed:      {}", summary.failed);
    println!("Stalled branches:  {}", summary.stalled);
    println!("Empty sub-tiles:   {}", summary.empty_inputs);
    println!("Uptime:            {}", summary.uptime_human());
    Ok(())
}
