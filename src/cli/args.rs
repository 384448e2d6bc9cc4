use std::fmt;
use std::str::FromStr;
use clap::{Args, Parser, Subcommand, ValueEnum};
use crate::config::defs::{DEFAULT_KIT_NAME, DEFAULT_MODELS_DIR, DEFAULT_STATIONARY_DIR};

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq)]
pub enum Accuracy {
    #[default]
    Hac,
    Sup,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq)]
pub enum Device {
    /// First GPU
    #[default]
    #[value(name = "0")]
    Gpu0,
    /// Apple Silicon
    Metal,
    #[value(name = "cuda:all")]
    CudaAll,
}

/// Which guanine of the telomeric repeat carries the 8-oxoG.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Hash)]
#[value(rename_all = "verbatim")]
pub enum GType {
    G29,
    G30,
    G31,
    G35,
}

fn value_name<T: ValueEnum>(value: &T) -> String {
    value
        .to_possible_value()
        .map(|v| v.get_name().to_string())
        .unwrap_or_default()
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", value_name(self))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", value_name(self))
    }
}

impl fmt::Display for GType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", value_name(self))
    }
}

impl FromStr for GType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <GType as ValueEnum>::from_str(s.trim(), true)
            .map_err(|_| format!("Unknown G type '{}' (expected one of G29, G30, G31, G35)", s))
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "nanopore-pipelines", version, about = "Wrappers for dorado, remora and samtools pipelines")]
pub struct Arguments {
    #[arg(short = 'v', long = "verbose", global = true, action)]
    pub verbose: bool,

    #[arg(long, global = true, help = "Print the commands that would run without executing them")]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Dorado basecalling, optional BAM clean-up and demultiplexing
    Basecall(BasecallArgs),
    /// Remora dataset preparation, plotting, training and inference
    Remora(RemoraArgs),
    /// Filter a BAM file with samtools
    Filter(FilterArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct BasecallArgs {
    #[arg(long, default_value_t = 9, help = "Minimum q-score")]
    pub qscore: u8,

    #[arg(long, default_value = "0", value_enum, help = "Device type: 0 for GPU, metal for Apple Silicon")]
    pub device: Device,

    #[arg(long, default_value = "hac", value_enum)]
    pub accuracy: Accuracy,

    #[arg(long, required = true, help = "Path to pod5 folder or file")]
    pub pod5: String,

    #[arg(long, help = "Path to reference fasta file (optional)")]
    pub reference: Option<String>,

    #[arg(long)]
    pub emit_moves: bool,

    #[arg(long, help = "Do not trim reads")]
    pub no_trim: bool,

    #[arg(long, help = "Do not trim reads for demultiplexing")]
    pub demux_no_trim: bool,

    #[arg(long, required = true, help = "Output file name (.bam or .fastq)")]
    pub output: String,

    #[arg(long, help = "Remove mapped reads with score of 0")]
    pub remove_map0: bool,

    #[arg(long)]
    pub remove_unmapped: bool,

    #[arg(long, default_value = DEFAULT_KIT_NAME)]
    pub kit_name: String,

    #[arg(long, default_value = DEFAULT_MODELS_DIR, help = "Directory holding the dorado basecalling models")]
    pub models_dir: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RemoraArgs {
    #[arg(long, required = true, help = "Path to pod5 file or directory")]
    pub pod5: String,

    #[arg(long, required = true, help = "Path to canonical BAM file")]
    pub can_bam: String,

    #[arg(long, conflicts_with = "g_positions", help = "Motif sequence (e.g., TTAGGG)")]
    pub motif: Option<String>,

    #[arg(long, conflicts_with = "g_positions", help = "Which base is modified (0 represents the first letter)")]
    pub mod_num: Option<usize>,

    #[arg(long, conflicts_with = "g_positions", help = "Path to modified BAM file")]
    pub mod_bam: Option<String>,

    #[arg(long, value_enum, conflicts_with = "g_positions", help = "Which G is modified")]
    pub g_type: Option<GType>,

    #[arg(
        long,
        help = "Comma-separated G positions: G29:TTAGGG:3:/path/to/bam[:pod5[:focus_bed]],G30:..."
    )]
    pub g_positions: Option<String>,

    #[arg(long, num_args = 1.., help = "Dataset weights for canonical then modified chunks (e.g., 16 16 1 1)")]
    pub dataset_weights: Option<Vec<u32>>,

    #[arg(long)]
    pub plot: bool,

    #[arg(long, help = "Path to canonical pod5 file for plotting")]
    pub can_pod5: Option<String>,

    #[arg(long, help = "Path to modified pod5 file for plotting")]
    pub mod_pod5: Option<String>,

    #[arg(long)]
    pub can_sort_bam: Option<String>,

    #[arg(long)]
    pub mod_sort_bam: Option<String>,

    #[arg(long, help = "Train a model")]
    pub train: bool,

    #[arg(long, help = "Perform inference")]
    pub infer: bool,

    #[arg(long, help = "Path to model for inference")]
    pub model: Option<String>,

    #[arg(long, default_value_t = 50)]
    pub chunk_context: u32,

    #[arg(long, default_value = DEFAULT_STATIONARY_DIR, help = "Directory with levels table, focus BEDs and model definition")]
    pub stationary_dir: String,

    #[arg(long, default_value = "cuda:0")]
    pub train_device: String,

    #[arg(long, default_value = "0")]
    pub infer_device: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    #[arg(long, required = true, help = "Input BAM file path")]
    pub input: String,

    #[arg(long, required = true, help = "Output BAM file path")]
    pub output: String,

    #[arg(long, default_value_t = 0, help = "Minimum mapping quality score")]
    pub min_mapq: u32,

    #[arg(long)]
    pub remove_unmapped: bool,

    #[arg(long, help = "Remove reads with mapping quality 0")]
    pub remove_map0: bool,

    #[arg(long, help = "Minimum read length to keep (optional)")]
    pub min_length: Option<u64>,

    #[arg(long, help = "Remove reads with insertions or deletions")]
    pub remove_indels: bool,
}
