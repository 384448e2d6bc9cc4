pub mod dorado;
pub mod remora;
pub mod samtools_filter;

use log::info;
use crate::config::defs::PipelineError;
use crate::utils::runner::{CommandRunner, ProcessResult};


/// Runs one pipeline stage. Any non-zero exit stops the pipeline: the caller
/// gets `ToolFailed` and later stages never run.
///
/// # Arguments
///
/// * `runner` - Executes the command.
/// * `tool` - Tool tag, used in errors.
/// * `label` - Stage name for the log.
/// * `command` - Full shell command line.
///
/// # Returns
/// The finished stage's `ProcessResult`.
pub async fn run_stage<R: CommandRunner>(
    runner: &mut R,
    tool: &str,
    label: &str,
    command: &str,
) -> Result<ProcessResult, PipelineError> {
    info!("=== {} ===", label);
    let result = runner
        .run(command)
        .await
        .map_err(|e| PipelineError::ToolExecution {
            tool: tool.to_string(),
            error: e.to_string(),
        })?;

    if !result.success() {
        return Err(PipelineError::ToolFailed {
            tool: tool.to_string(),
            status: result.status,
        });
    }
    info!("{} completed successfully!", label);
    Ok(result)
}
