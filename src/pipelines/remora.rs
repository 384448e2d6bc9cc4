use std::collections::HashSet;
use std::path::PathBuf;
use log::info;
use crate::cli::{GType, RemoraArgs};
use crate::config::defs::{
    PipelineError, RunConfig, CAN_FOCUS_BED, CAN_INFER_BAM, CAN_INFER_LOG, LEVELS_TABLE,
    MOD_WEIGHT, MULTI_CAN_WEIGHT, REMORA_LOG_DIR, REMORA_PARAM_LOG, REMORA_TAG,
    TRAIN_DATASET_CONFIG, TRAIN_DATASET_LOG, TRAIN_MODEL_DEF, TRAIN_RESULTS_DIR,
};
use crate::utils::command::{join_cli, remora};
use crate::utils::command::remora::ChunkKind;
use crate::utils::file::sanitize_path;
use crate::utils::param_log::{append_record, flag_field, InvocationRecord};
use crate::utils::runner::CommandRunner;

pub const PARAM_LOG_HEADER: [&str; 13] = [
    "JobID", "Timestamp", "Pod5", "CanBAM", "Motifs", "GPositions", "Mode",
    "Plot", "Train", "Infer", "Model", "ChunkContext", "DatasetWeights",
];


/// One modified guanine to build datasets for.
#[derive(Debug, Clone, PartialEq)]
pub struct ModPosition {
    pub g_type: GType,
    pub motif: String,
    pub mod_num: usize,
    pub mod_bam: String,
    pub pod5: Option<String>,
    pub focus_bed: Option<String>,
}

impl ModPosition {
    pub fn can_chunks(&self) -> String {
        format!("can_{}_chunks", self.g_type)
    }

    pub fn mod_chunks(&self) -> String {
        format!("8oxo{}_chunks", self.g_type)
    }

    pub fn infer_bam(&self) -> String {
        format!("{}_infer.bam", self.g_type)
    }

    pub fn infer_log(&self) -> String {
        format!("{}_infer.log", self.g_type)
    }

    pub fn plot_log(&self) -> String {
        format!("plot_{}.log", self.g_type)
    }

    /// The focus BED given for this position, else the stationary default.
    pub fn focus_bed(&self, stationary_dir: &str) -> String {
        self.focus_bed
            .clone()
            .unwrap_or_else(|| format!("{}/focus_reference_positions{}.bed", stationary_dir, self.g_type))
    }
}


/// How the positions were supplied on the command line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionMode {
    Single,
    Multi,
}

impl PositionMode {
    fn as_field(&self) -> &'static str {
        match self {
            PositionMode::Single => "single_g",
            PositionMode::Multi => "multi_g",
        }
    }
}


/// Parses `G29:TTAGGG:3:/path/a.bam[:pod5[:focus_bed]],G30:...`.
///
/// # Arguments
///
/// * `spec` - The `--g-positions` value.
///
/// # Returns
/// Positions in the order given.
pub fn parse_g_positions(spec: &str) -> Result<Vec<ModPosition>, PipelineError> {
    let mut positions = Vec::new();
    for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let parts: Vec<&str> = entry.split(':').map(str::trim).collect();
        if parts.len() < 4 || parts.len() > 6 {
            return Err(PipelineError::InvalidConfig(format!(
                "Failed to parse G position '{}'. Use format: G29:TTAGGG:3:/path/to/bam[:pod5[:focus_bed]]",
                entry
            )));
        }
        let g_type: GType = parts[0].parse().map_err(PipelineError::InvalidConfig)?;
        let mod_num: usize = parts[2].parse().map_err(|_| {
            PipelineError::InvalidConfig(format!("Invalid modified base index '{}' in '{}'", parts[2], entry))
        })?;
        let optional = |i: usize| parts.get(i).filter(|p| !p.is_empty()).map(|p| p.to_string());
        positions.push(ModPosition {
            g_type,
            motif: parts[1].to_string(),
            mod_num,
            mod_bam: parts[3].to_string(),
            pod5: optional(4),
            focus_bed: optional(5),
        });
    }
    if positions.is_empty() {
        return Err(PipelineError::InvalidConfig("No G positions given".to_string()));
    }
    Ok(positions)
}


/// Fully validated and sanitized inputs for one remora run.
#[derive(Debug, Clone)]
pub struct RemoraJob {
    pub pod5: String,
    pub can_bam: String,
    pub positions: Vec<ModPosition>,
    pub mode: PositionMode,
    pub plot_inputs: Option<PlotInputs>,
    pub train: bool,
    pub model: Option<String>,
    pub infer: bool,
    pub chunk_context: u32,
    pub dataset_weights: Option<Vec<u32>>,
    pub stationary_dir: String,
    pub train_device: String,
    pub infer_device: String,
}

#[derive(Debug, Clone)]
pub struct PlotInputs {
    pub can_pod5: String,
    pub mod_pod5: String,
    pub can_sort_bam: String,
    pub mod_sort_bam: String,
}

impl RemoraJob {
    /// Collects positions from either the single-position flags or
    /// `--g-positions`, checks flag combinations, and sanitizes every path.
    pub fn from_args(args: &RemoraArgs, config: &RunConfig) -> Result<Self, PipelineError> {
        let (mut positions, mode) = match &args.g_positions {
            Some(spec) => (parse_g_positions(spec)?, PositionMode::Multi),
            None => match (&args.motif, args.mod_num, &args.mod_bam, args.g_type) {
                (Some(motif), Some(mod_num), Some(mod_bam), Some(g_type)) => (
                    vec![ModPosition {
                        g_type,
                        motif: motif.clone(),
                        mod_num,
                        mod_bam: mod_bam.clone(),
                        pod5: None,
                        focus_bed: None,
                    }],
                    PositionMode::Single,
                ),
                _ => {
                    return Err(PipelineError::InvalidConfig(
                        "Single mode requires --motif, --mod-num, --mod-bam, and --g-type (or use --g-positions)"
                            .to_string(),
                    ));
                }
            },
        };

        let mut seen = HashSet::new();
        for position in &positions {
            if position.motif.is_empty() {
                return Err(PipelineError::InvalidConfig(format!("Empty motif for {}", position.g_type)));
            }
            if position.mod_num >= position.motif.len() {
                return Err(PipelineError::InvalidConfig(format!(
                    "Modified base index {} is outside motif {} for {}",
                    position.mod_num, position.motif, position.g_type
                )));
            }
            if !seen.insert(position.g_type) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{} given more than once; chunk folders would collide",
                    position.g_type
                )));
            }
        }

        if let Some(weights) = &args.dataset_weights {
            if weights.len() != positions.len() * 2 {
                return Err(PipelineError::InvalidConfig(format!(
                    "--dataset-weights needs {} values (canonical then modified per position), got {}",
                    positions.len() * 2,
                    weights.len()
                )));
            }
        }

        let cwd = &config.cwd;
        let plot_inputs = if args.plot {
            match (&args.can_pod5, &args.mod_pod5, &args.can_sort_bam, &args.mod_sort_bam) {
                (Some(can_pod5), Some(mod_pod5), Some(can_sort_bam), Some(mod_sort_bam)) => Some(PlotInputs {
                    can_pod5: sanitize_path(can_pod5, cwd),
                    mod_pod5: sanitize_path(mod_pod5, cwd),
                    can_sort_bam: sanitize_path(can_sort_bam, cwd),
                    mod_sort_bam: sanitize_path(mod_sort_bam, cwd),
                }),
                _ => {
                    return Err(PipelineError::InvalidConfig(
                        "--plot requires --can-pod5, --mod-pod5, --can-sort-bam, and --mod-sort-bam".to_string(),
                    ));
                }
            }
        } else {
            None
        };

        if args.infer && args.model.is_none() {
            return Err(PipelineError::InvalidConfig("--infer requires --model".to_string()));
        }

        for position in positions.iter_mut() {
            position.mod_bam = sanitize_path(&position.mod_bam, cwd);
            position.pod5 = position.pod5.as_deref().map(|p| sanitize_path(p, cwd));
            position.focus_bed = position.focus_bed.as_deref().map(|b| sanitize_path(b, cwd));
        }

        Ok(RemoraJob {
            pod5: sanitize_path(&args.pod5, cwd),
            can_bam: sanitize_path(&args.can_bam, cwd),
            positions,
            mode,
            plot_inputs,
            train: args.train,
            model: args.model.as_deref().map(|m| sanitize_path(m, cwd)),
            infer: args.infer,
            chunk_context: args.chunk_context,
            dataset_weights: args.dataset_weights.clone(),
            stationary_dir: sanitize_path(&args.stationary_dir, cwd).trim_end_matches('/').to_string(),
            train_device: args.train_device.clone(),
            infer_device: args.infer_device.clone(),
        })
    }

    fn stationary(&self, name: &str) -> String {
        format!("{}/{}", self.stationary_dir, name)
    }

    /// Explicit weights, or one canonical and one modified weight per
    /// position: 1/1 for a single position, 16/1 when several are combined.
    pub fn weights(&self) -> Vec<u32> {
        if let Some(weights) = &self.dataset_weights {
            return weights.clone();
        }
        let n = self.positions.len();
        let can_weight = if n > 1 { MULTI_CAN_WEIGHT } else { MOD_WEIGHT };
        let mut weights = vec![can_weight; n];
        weights.extend(std::iter::repeat_n(MOD_WEIGHT, n));
        weights
    }
}


/// Appends this invocation to `remora_logs/remora_runs.csv`.
pub fn log_parameters(config: &RunConfig, job: &RemoraJob) -> Result<PathBuf, PipelineError> {
    let motifs = job
        .positions
        .iter()
        .map(|p| format!("{}:{}", p.motif, p.mod_num))
        .collect::<Vec<_>>()
        .join(",");
    let g_positions = job
        .positions
        .iter()
        .map(|p| p.g_type.to_string())
        .collect::<Vec<_>>()
        .join(",");
    let weights = match &job.dataset_weights {
        Some(w) => w.iter().map(u32::to_string).collect::<Vec<_>>().join(" "),
        None => "default_weights".to_string(),
    };

    let record = InvocationRecord::new(
        config,
        vec![
            job.pod5.clone(),
            job.can_bam.clone(),
            motifs,
            g_positions,
            job.mode.as_field().to_string(),
            flag_field(job.plot_inputs.is_some(), "plot", "no_plot"),
            flag_field(job.train, "train", "no_train"),
            flag_field(job.infer, "infer", "no_infer"),
            job.model.clone().unwrap_or_else(|| "no_model".to_string()),
            job.chunk_context.to_string(),
            weights,
        ],
    );
    let path = config.resolve(PathBuf::from(REMORA_LOG_DIR).join(REMORA_PARAM_LOG));
    append_record(&path, &PARAM_LOG_HEADER, &record)?;
    Ok(path)
}


async fn dataset_prepare<R: CommandRunner>(
    config: &RunConfig,
    job: &RemoraJob,
    runner: &mut R,
) -> Result<(), PipelineError> {
    let pending: Vec<&ModPosition> = job
        .positions
        .iter()
        .filter(|p| {
            let done = config.resolve(p.can_chunks()).exists() && config.resolve(p.mod_chunks()).exists();
            if done {
                info!("Chunk folders already exist for {}. Skipping dataset preparation.", p.g_type);
            }
            !done
        })
        .collect();

    let levels = job.stationary(LEVELS_TABLE);

    for position in &pending {
        let prepare = remora::PrepareConfig {
            pod5: job.pod5.clone(),
            bam: job.can_bam.clone(),
            output_path: position.can_chunks(),
            levels_table: levels.clone(),
            motif: position.motif.clone(),
            mod_num: position.mod_num,
            kind: ChunkKind::Canonical,
            focus_bed: position.focus_bed(&job.stationary_dir),
        };
        let cmd = join_cli(&remora::prepare_args(&prepare));
        let label = format!("Canonical dataset preparation ({})", position.g_type);
        super::run_stage(runner, REMORA_TAG, &label, &cmd).await?;
    }

    for position in &pending {
        let prepare = remora::PrepareConfig {
            pod5: position.pod5.clone().unwrap_or_else(|| job.pod5.clone()),
            bam: position.mod_bam.clone(),
            output_path: position.mod_chunks(),
            levels_table: levels.clone(),
            motif: position.motif.clone(),
            mod_num: position.mod_num,
            kind: ChunkKind::Modified,
            focus_bed: position.focus_bed(&job.stationary_dir),
        };
        let cmd = join_cli(&remora::prepare_args(&prepare));
        let label = format!("Modified dataset preparation ({})", position.g_type);
        super::run_stage(runner, REMORA_TAG, &label, &cmd).await?;
    }
    Ok(())
}


async fn dataset_plotting<R: CommandRunner>(
    job: &RemoraJob,
    inputs: &PlotInputs,
    runner: &mut R,
) -> Result<(), PipelineError> {
    for position in &job.positions {
        let plot = remora::PlotConfig {
            can_pod5: inputs.can_pod5.clone(),
            can_bam: inputs.can_sort_bam.clone(),
            mod_pod5: inputs.mod_pod5.clone(),
            mod_bam: inputs.mod_sort_bam.clone(),
            ref_regions: job.stationary(CAN_FOCUS_BED),
            highlight_ranges: position.focus_bed(&job.stationary_dir),
            levels_table: job.stationary(LEVELS_TABLE),
            log_file: position.plot_log(),
        };
        let cmd = join_cli(&remora::plot_args(&plot));
        super::run_stage(runner, REMORA_TAG, &format!("Plotting ({})", position.g_type), &cmd).await?;
    }
    Ok(())
}


async fn dataset_train<R: CommandRunner>(job: &RemoraJob, runner: &mut R) -> Result<(), PipelineError> {
    let mut chunk_dirs: Vec<String> = job.positions.iter().map(ModPosition::can_chunks).collect();
    chunk_dirs.extend(job.positions.iter().map(ModPosition::mod_chunks));

    let cmd = join_cli(&remora::make_config_args(
        TRAIN_DATASET_CONFIG,
        &chunk_dirs,
        &job.weights(),
        TRAIN_DATASET_LOG,
    ));
    super::run_stage(runner, REMORA_TAG, "Dataset configuration", &cmd).await?;

    let train = remora::TrainConfig {
        dataset_config: TRAIN_DATASET_CONFIG.to_string(),
        model_def: job.stationary(TRAIN_MODEL_DEF),
        device: job.train_device.clone(),
        chunk_context: job.chunk_context,
        output_path: TRAIN_RESULTS_DIR.to_string(),
    };
    let cmd = join_cli(&remora::train_args(&train));
    super::run_stage(runner, REMORA_TAG, "Training", &cmd).await?;
    Ok(())
}


async fn dataset_infer<R: CommandRunner>(job: &RemoraJob, model: &str, runner: &mut R) -> Result<(), PipelineError> {
    let canonical = remora::InferConfig {
        pod5: job.pod5.clone(),
        bam: job.can_bam.clone(),
        model: model.to_string(),
        out_bam: CAN_INFER_BAM.to_string(),
        log_file: CAN_INFER_LOG.to_string(),
        device: job.infer_device.clone(),
    };
    let cmd = join_cli(&remora::infer_args(&canonical));
    super::run_stage(runner, REMORA_TAG, "Canonical inference", &cmd).await?;

    for position in &job.positions {
        let modified = remora::InferConfig {
            pod5: position.pod5.clone().unwrap_or_else(|| job.pod5.clone()),
            bam: position.mod_bam.clone(),
            model: model.to_string(),
            out_bam: position.infer_bam(),
            log_file: position.infer_log(),
            device: job.infer_device.clone(),
        };
        let cmd = join_cli(&remora::infer_args(&modified));
        super::run_stage(runner, REMORA_TAG, &format!("Inference ({})", position.g_type), &cmd).await?;
    }
    Ok(())
}


/// Runs dataset preparation, then plotting, training and inference as
/// requested. All stages operate on the same ordered list of positions.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
/// * `args` - Parsed `remora` arguments.
/// * `runner` - Executes the generated commands.
pub async fn run<R: CommandRunner>(
    config: &RunConfig,
    args: &RemoraArgs,
    runner: &mut R,
) -> Result<(), PipelineError> {
    println!("\n-------------\n Remora\n-------------\n");
    let job = RemoraJob::from_args(args, config)?;
    log_parameters(config, &job)?;

    dataset_prepare(config, &job, runner).await?;

    if let Some(inputs) = &job.plot_inputs {
        dataset_plotting(&job, inputs, runner).await?;
    }

    if job.train {
        dataset_train(&job, runner).await?;
    }

    if job.infer {
        if let Some(model) = &job.model {
            dataset_infer(&job, model, runner).await?;
        }
    }

    info!("Remora pipeline completed!");
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config() -> RunConfig {
        RunConfig::new(PathBuf::from("/work/run"), HashMap::new(), false)
    }

    fn single_args() -> RemoraArgs {
        RemoraArgs {
            pod5: "/work/run/pod5".to_string(),
            can_bam: "can.bam".to_string(),
            motif: Some("TTAGGG".to_string()),
            mod_num: Some(3),
            mod_bam: Some("/work/run/mod.bam".to_string()),
            g_type: Some(GType::G29),
            chunk_context: 50,
            stationary_dir: "stationaryfiles".to_string(),
            train_device: "cuda:0".to_string(),
            infer_device: "0".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_g_positions() -> Result<(), PipelineError> {
        let positions = parse_g_positions("G29:TTAGGG:3:/a.bam, G30:TTAGGG:4:/b.bam:/p.pod5:/f.bed")?;
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].g_type, GType::G29);
        assert_eq!(positions[0].mod_num, 3);
        assert_eq!(positions[0].pod5, None);
        assert_eq!(positions[1].pod5.as_deref(), Some("/p.pod5"));
        assert_eq!(positions[1].focus_bed.as_deref(), Some("/f.bed"));
        assert_eq!(positions[1].focus_bed("sf"), "/f.bed");
        assert_eq!(positions[0].focus_bed("sf"), "sf/focus_reference_positionsG29.bed");
        Ok(())
    }

    #[test]
    fn test_parse_g_positions_rejects_bad_entries() {
        assert!(parse_g_positions("G29:TTAGGG:3").is_err());
        assert!(parse_g_positions("G28:TTAGGG:3:/a.bam").is_err());
        assert!(parse_g_positions("G29:TTAGGG:x:/a.bam").is_err());
        assert!(parse_g_positions("").is_err());
    }

    #[test]
    fn test_single_mode_job() -> Result<(), PipelineError> {
        let job = RemoraJob::from_args(&single_args(), &config())?;
        assert_eq!(job.mode, PositionMode::Single);
        assert_eq!(job.pod5, "pod5");
        assert_eq!(job.positions[0].mod_bam, "mod.bam");
        assert_eq!(job.weights(), vec![1, 1]);
        Ok(())
    }

    #[test]
    fn test_multi_default_weights() -> Result<(), PipelineError> {
        let mut args = single_args();
        args.motif = None;
        args.mod_num = None;
        args.mod_bam = None;
        args.g_type = None;
        args.g_positions = Some("G29:TTAGGG:3:a.bam,G30:TTAGGG:4:b.bam".to_string());
        let job = RemoraJob::from_args(&args, &config())?;
        assert_eq!(job.mode, PositionMode::Multi);
        assert_eq!(job.weights(), vec![16, 16, 1, 1]);

        args.dataset_weights = Some(vec![4, 4, 1]);
        assert!(RemoraJob::from_args(&args, &config()).is_err());
        args.dataset_weights = Some(vec![4, 4, 1, 2]);
        assert_eq!(RemoraJob::from_args(&args, &config())?.weights(), vec![4, 4, 1, 2]);
        Ok(())
    }

    #[test]
    fn test_flag_requirements() {
        let mut args = single_args();
        args.infer = true;
        assert!(matches!(RemoraJob::from_args(&args, &config()), Err(PipelineError::InvalidConfig(_))));

        let mut args = single_args();
        args.plot = true;
        args.can_pod5 = Some("c.pod5".to_string());
        assert!(RemoraJob::from_args(&args, &config()).is_err());

        let mut args = single_args();
        args.mod_num = Some(6);
        assert!(RemoraJob::from_args(&args, &config()).is_err());

        let mut args = single_args();
        args.g_type = None;
        assert!(RemoraJob::from_args(&args, &config()).is_err());
    }

    #[test]
    fn test_duplicate_positions_rejected() {
        let mut args = single_args();
        args.g_positions = Some("G29:TTAGGG:3:a.bam,G29:TTAGGG:3:b.bam".to_string());
        assert!(RemoraJob::from_args(&args, &config()).is_err());
    }

    #[test]
    fn test_focus_bed_and_stationary_dir_sanitized() -> Result<(), PipelineError> {
        let mut args = single_args();
        args.g_positions = Some("G30:TTAGGG:4:b.bam:p.pod5:/work/run/beds/g30.bed".to_string());
        args.stationary_dir = "/work/run/stationaryfiles/".to_string();
        let job = RemoraJob::from_args(&args, &config())?;
        assert_eq!(job.positions[0].focus_bed.as_deref(), Some("beds/g30.bed"));
        assert_eq!(job.stationary_dir, "stationaryfiles");
        assert_eq!(job.stationary(LEVELS_TABLE), "stationaryfiles/levels.txt");
        Ok(())
    }
}
