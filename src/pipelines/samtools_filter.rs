use std::path::PathBuf;
use log::{error, info};
use crate::cli::FilterArgs;
use crate::config::defs::{PipelineError, RunConfig, FILTER_PARAM_LOG, SAMTOOLS_TAG};
use crate::utils::command::{join_cli, samtools};
use crate::utils::command::samtools::{ViewFilterConfig, UNMAPPED_FLAG};
use crate::utils::file::ensure_parent_dir;
use crate::utils::param_log::{append_record, flag_field, InvocationRecord};
use crate::utils::runner::CommandRunner;

pub const PARAM_LOG_HEADER: [&str; 9] = [
    "Job ID", "Timestamp", "Input", "Output", "Min MapQ", "Remove Unmapped",
    "Remove Map0", "Min Length", "Remove Indels",
];


#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOptions {
    pub min_mapq: u32,
    pub remove_unmapped: bool,
    pub remove_map0: bool,
    pub min_length: Option<u64>,
    pub remove_indels: bool,
}

impl From<&FilterArgs> for FilterOptions {
    fn from(args: &FilterArgs) -> Self {
        FilterOptions {
            min_mapq: args.min_mapq,
            remove_unmapped: args.remove_unmapped,
            remove_map0: args.remove_map0,
            min_length: args.min_length,
            remove_indels: args.remove_indels,
        }
    }
}


/// The shell command implementing `options`. Indel removal takes precedence
/// over every other filter. Dropping MAPQ 0 is a MAPQ floor of 1, merged
/// with any explicit minimum.
pub fn filter_command(input: &str, output: &str, options: &FilterOptions) -> String {
    if options.remove_indels {
        return join_cli(&samtools::indel_filter_args(input, output));
    }

    let map0_floor = if options.remove_map0 { 1 } else { 0 };
    let view = ViewFilterConfig {
        input: input.to_string(),
        output: output.to_string(),
        min_mapq: options.min_mapq.max(map0_floor),
        exclude_flags: options.remove_unmapped.then_some(UNMAPPED_FLAG),
        min_length: options.min_length,
    };
    join_cli(&samtools::view_filter_args(&view))
}


/// Filters `input_bam` into `output_bam`.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main; relative paths resolve against its cwd.
/// * `runner` - Executes the samtools command.
/// * `input_bam` - Existing BAM to filter.
/// * `output_bam` - Destination; its directory is created if needed.
/// * `options` - Which filters to apply.
///
/// # Returns
/// `true` when samtools exits 0, `false` otherwise. A missing input is
/// `FileNotFound` and nothing is run.
pub async fn filter_bam<R: CommandRunner>(
    config: &RunConfig,
    runner: &mut R,
    input_bam: &str,
    output_bam: &str,
    options: &FilterOptions,
) -> Result<bool, PipelineError> {
    let input_path = config.resolve(input_bam);
    if !input_path.exists() {
        return Err(PipelineError::FileNotFound(PathBuf::from(input_bam)));
    }

    ensure_parent_dir(&config.resolve(output_bam))?;

    let cmd = filter_command(input_bam, output_bam, options);
    let result = runner
        .run(&cmd)
        .await
        .map_err(|e| PipelineError::ToolExecution {
            tool: SAMTOOLS_TAG.to_string(),
            error: e.to_string(),
        })?;

    if result.success() {
        if options.remove_indels {
            info!("Successfully filtered BAM file (removed indels). Output written to: {}", output_bam);
        } else {
            info!("Successfully filtered BAM file. Output written to: {}", output_bam);
        }
        Ok(true)
    } else {
        error!("Failed to filter BAM file. Return code: {}", result.status);
        Ok(false)
    }
}


/// Appends this invocation to `samtools_filter_parameters.csv`.
pub fn log_parameters(config: &RunConfig, args: &FilterArgs) -> Result<PathBuf, PipelineError> {
    let record = InvocationRecord::new(
        config,
        vec![
            args.input.clone(),
            args.output.clone(),
            args.min_mapq.to_string(),
            flag_field(args.remove_unmapped, "remove_unmapped", ""),
            flag_field(args.remove_map0, "remove_map0", ""),
            args.min_length.map(|l| l.to_string()).unwrap_or_default(),
            flag_field(args.remove_indels, "remove_indels", ""),
        ],
    );
    let path = config.resolve(FILTER_PARAM_LOG);
    append_record(&path, &PARAM_LOG_HEADER, &record)?;
    Ok(path)
}


pub async fn run<R: CommandRunner>(
    config: &RunConfig,
    args: &FilterArgs,
    runner: &mut R,
) -> Result<(), PipelineError> {
    log_parameters(config, args)?;
    let options = FilterOptions::from(args);
    if filter_bam(config, runner, &args.input, &args.output, &options).await? {
        Ok(())
    } else {
        Err(PipelineError::FilterFailed(PathBuf::from(&args.output)))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_filters_is_plain_copy() {
        let cmd = filter_command("in.bam", "out.bam", &FilterOptions::default());
        assert_eq!(cmd, "samtools view -b in.bam > out.bam");
    }

    #[test]
    fn test_map0_merges_with_min_mapq() {
        let options = FilterOptions { remove_map0: true, ..Default::default() };
        assert_eq!(filter_command("i", "o", &options), "samtools view -b -q 1 i > o");

        let options = FilterOptions { remove_map0: true, min_mapq: 30, ..Default::default() };
        assert_eq!(filter_command("i", "o", &options), "samtools view -b -q 30 i > o");
    }

    #[test]
    fn test_unmapped_and_length() {
        let options = FilterOptions {
            remove_unmapped: true,
            min_length: Some(1000),
            ..Default::default()
        };
        assert_eq!(filter_command("i", "o", &options), "samtools view -b -F 4 -e 'rlen > 1000' i > o");
    }

    #[test]
    fn test_indels_short_circuit() {
        let options = FilterOptions {
            min_mapq: 20,
            remove_unmapped: true,
            remove_map0: true,
            min_length: Some(50),
            remove_indels: true,
        };
        let cmd = filter_command("i.bam", "o.bam", &options);
        assert_eq!(cmd, join_cli(&samtools::indel_filter_args("i.bam", "o.bam")));
        assert!(!cmd.contains("-q"));
        assert!(!cmd.contains("-F"));
        assert!(!cmd.contains("rlen"));
    }
}
