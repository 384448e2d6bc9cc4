use std::io::Write;
use std::time::Instant;

use anyhow::Result;
use log::{LevelFilter, debug, error, info};
use env_logger::Builder;

use nanopore_pipelines::cli::{parse, Commands};
use nanopore_pipelines::config::defs::{PipelineError, RunConfig};
use nanopore_pipelines::pipelines::{dorado, remora, samtools_filter};
use nanopore_pipelines::utils::runner::{CommandRunner, DryRunner, ShellRunner};


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    let config = RunConfig::from_process(args.dry_run)?;
    info!("The current directory is {:?}", config.cwd);
    debug!("Job ID: {}", config.job_id);

    let outcome = if config.dry_run {
        let mut runner = DryRunner::new();
        dispatch(&config, &args.command, &mut runner).await
    } else {
        let mut runner = ShellRunner::new(config.clone());
        dispatch(&config, &args.command, &mut runner).await
    };

    if let Err(e) = outcome {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    info!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


async fn dispatch<R: CommandRunner>(
    config: &RunConfig,
    command: &Commands,
    runner: &mut R,
) -> Result<(), PipelineError> {
    match command {
        Commands::Basecall(basecall_args) => dorado::run(config, basecall_args, runner).await.map(|_| ()),
        Commands::Remora(remora_args) => remora::run(config, remora_args, runner).await,
        Commands::Filter(filter_args) => samtools_filter::run(config, filter_args, runner).await,
    }
}
