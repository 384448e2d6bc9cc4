use std::collections::HashMap;
use std::path::{Path, PathBuf};
use lazy_static::lazy_static;
use thiserror::Error;

// External software
pub const DORADO_TAG: &str = "dorado";
pub const SAMTOOLS_TAG: &str = "samtools";
pub const REMORA_TAG: &str = "remora";

/// Tools the runner checks for on PATH before spawning a shell.
pub const KNOWN_TOOLS: &[&str] = &[DORADO_TAG, SAMTOOLS_TAG, REMORA_TAG];

/// Exit status a shell reports for a command it cannot find.
pub const NOT_FOUND_STATUS: i32 = 127;

lazy_static! {
    pub static ref MODULE_HINTS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert(SAMTOOLS_TAG, "module load samtools' and 'module load openssl");
        m.insert(DORADO_TAG, "module load dorado");
        m.insert(REMORA_TAG, "module load remora");
        m
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DoradoSubcommand {
    Basecaller,
    Demux,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoraSubcommand {
    DatasetPrepare,
    DatasetMakeConfig,
    ModelTrain,
    InferFromPod5AndBam,
    AnalyzePlotRefRegion,
}

// Static Filenames
pub const DORADO_PARAM_LOG: &str = "dorado_job_parameters.csv";
pub const REMORA_LOG_DIR: &str = "remora_logs";
pub const REMORA_PARAM_LOG: &str = "remora_runs.csv";
pub const FILTER_PARAM_LOG: &str = "samtools_filter_parameters.csv";

pub const TRAIN_DATASET_CONFIG: &str = "train_dataset.jsn";
pub const TRAIN_DATASET_LOG: &str = "train_dataset.log";
pub const TRAIN_RESULTS_DIR: &str = "train_results";
pub const CAN_INFER_BAM: &str = "can_infer.bam";
pub const CAN_INFER_LOG: &str = "can_infer.log";

// Stationary files, relative to the stationary directory
pub const LEVELS_TABLE: &str = "levels.txt";
pub const TRAIN_MODEL_DEF: &str = "ConvLSTM_w_ref.py";
pub const CAN_FOCUS_BED: &str = "focus_reference_positionscan.bed";

// Static Parameters
pub const DEFAULT_MODELS_DIR: &str = "/project/romano_shared/telomeres/models";
pub const DORADO_MODEL_PREFIX: &str = "dna_r10.4.1_e8.2_400bps_";
pub const DORADO_MODEL_VERSION: &str = "v5.0.0";
pub const DEFAULT_KIT_NAME: &str = "SQK-NBD114-24";
pub const DEFAULT_STATIONARY_DIR: &str = "stationaryfiles";
pub const MOD_BASE_CODE: &str = "o";
pub const MOD_BASE_NAME: &str = "8oxoG";
pub const MULTI_CAN_WEIGHT: u32 = 16;
pub const MOD_WEIGHT: u32 = 1;

pub const JOB_ID_VAR: &str = "LSB_JOBID";
pub const LOCAL_JOB_ID: &str = "local";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub const BAM_EXT: &str = "bam";
pub const FASTQ_EXTS: &[&'static str] = &["fastq", "fq"];


/// Ambient state for one invocation. Captured once in `main` and handed to
/// every pipeline, so nothing below reads the process environment directly.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub job_id: String,
    pub dry_run: bool,
}

impl RunConfig {
    pub fn new(cwd: PathBuf, env: HashMap<String, String>, dry_run: bool) -> Self {
        let job_id = env
            .get(JOB_ID_VAR)
            .filter(|id| !id.is_empty())
            .cloned()
            .unwrap_or_else(|| LOCAL_JOB_ID.to_string());
        RunConfig { cwd, env, job_id, dry_run }
    }

    pub fn from_process(dry_run: bool) -> std::io::Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self::new(cwd, std::env::vars().collect(), dry_run))
    }

    /// Resolves a path against the run's working directory.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}


#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Input file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to execute {tool}: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("{tool} failed with return code {status}")]
    ToolFailed { tool: String, status: i32 },

    #[error("Failed to filter BAM file into {0}")]
    FilterFailed(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
