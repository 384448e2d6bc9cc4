use std::path::PathBuf;
use log::info;
use crate::cli::BasecallArgs;
use crate::config::defs::{PipelineError, RunConfig, BAM_EXT, DORADO_PARAM_LOG, DORADO_TAG, SAMTOOLS_TAG};
use crate::utils::command::{join_cli, dorado, samtools};
use crate::utils::command::samtools::{ViewFilterConfig, UNMAPPED_FLAG};
use crate::utils::file::{derived_output, is_fastq_path};
use crate::utils::param_log::{append_record, flag_field, InvocationRecord};
use crate::utils::runner::CommandRunner;

pub const PARAM_LOG_HEADER: [&str; 11] = [
    "Job ID", "Timestamp", "Pod5", "Output", "Accuracy", "Device", "Q-score",
    "Reference", "Moves", "Remove Map0", "Remove Unmapped",
];


/// Appends this invocation to `dorado_job_parameters.csv` in the working directory.
pub fn log_parameters(config: &RunConfig, args: &BasecallArgs) -> Result<PathBuf, PipelineError> {
    let record = InvocationRecord::new(
        config,
        vec![
            args.pod5.clone(),
            args.output.clone(),
            args.accuracy.to_string(),
            args.device.to_string(),
            args.qscore.to_string(),
            args.reference
                .clone()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| "no_reference".to_string()),
            flag_field(args.emit_moves, "moves_enabled", ""),
            flag_field(args.remove_map0, "remove_map0", ""),
            flag_field(args.remove_unmapped, "remove_unmapped", ""),
        ],
    );
    let path = config.resolve(DORADO_PARAM_LOG);
    append_record(&path, &PARAM_LOG_HEADER, &record)?;
    Ok(path)
}


/// The basecaller command for `args`.
pub fn basecaller_command(args: &BasecallArgs) -> String {
    let config = dorado::BasecallerConfig {
        emit_moves: args.emit_moves,
        no_trim: args.no_trim,
        min_qscore: args.qscore,
        device: args.device,
        model_path: dorado::model_path(&args.models_dir, args.accuracy),
        pod5: args.pod5.clone(),
        emit_fastq: is_fastq_path(&args.output),
        reference: args.reference.clone().filter(|r| !r.is_empty()),
        kit_name: args.kit_name.clone(),
        output: args.output.clone(),
    };
    join_cli(&dorado::basecaller_args(&config))
}


/// Basecalls, optionally strips MAPQ 0 and unmapped reads, then demultiplexes.
/// Each stage reads the file the previous stage wrote; the first failing
/// stage ends the run.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
/// * `args` - Parsed `basecall` arguments.
/// * `runner` - Executes the generated commands.
///
/// # Returns
/// Path of the final file handed to the demultiplexer.
pub async fn run<R: CommandRunner>(
    config: &RunConfig,
    args: &BasecallArgs,
    runner: &mut R,
) -> Result<String, PipelineError> {
    println!("\n-------------\n Dorado Basecalling\n-------------\n");
    log_parameters(config, args)?;

    let fastq = is_fastq_path(&args.output);
    let basecall_cmd = basecaller_command(args);
    super::run_stage(runner, DORADO_TAG, "Basecalling", &basecall_cmd).await?;

    let mut current = args.output.clone();

    if args.remove_map0 && !fastq {
        let map0_out = derived_output(&current, "map0", Some(BAM_EXT));
        let view = ViewFilterConfig {
            input: current.clone(),
            output: map0_out.clone(),
            min_mapq: 1,
            ..Default::default()
        };
        let cmd = join_cli(&samtools::view_filter_args(&view));
        super::run_stage(runner, SAMTOOLS_TAG, "Processing mapped reads", &cmd).await?;
        current = map0_out;
    }

    if args.remove_unmapped && !fastq {
        let unmapped_out = derived_output(&current, "unmapped_remove", Some(BAM_EXT));
        let view = ViewFilterConfig {
            input: current.clone(),
            output: unmapped_out.clone(),
            exclude_flags: Some(UNMAPPED_FLAG),
            ..Default::default()
        };
        let cmd = join_cli(&samtools::view_filter_args(&view));
        super::run_stage(runner, SAMTOOLS_TAG, "Processing unmapped reads", &cmd).await?;
        current = unmapped_out;
    }

    if fastq && (args.remove_map0 || args.remove_unmapped) {
        info!("FASTQ output carries no alignments; skipping mapping filters");
    }

    let demux = dorado::DemuxConfig {
        input: current.clone(),
        output_dir: derived_output(&current, "demuxed", None),
        emit_fastq: fastq,
        no_trim: args.demux_no_trim,
    };
    let demux_cmd = join_cli(&dorado::demux_args(&demux));
    super::run_stage(runner, DORADO_TAG, "Demultiplexing", &demux_cmd).await?;

    info!("All processing completed!");
    Ok(current)
}
