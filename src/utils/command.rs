/// Functions and structs for building external tool command lines

use crate::config::defs::{DORADO_TAG, REMORA_TAG, SAMTOOLS_TAG};


/// Joins command tokens into the single string handed to the shell.
pub fn join_cli(tokens: &[String]) -> String {
    tokens.join(" ")
}


pub mod dorado {
    use crate::cli::{Accuracy, Device};
    use crate::config::defs::{DoradoSubcommand, DORADO_MODEL_PREFIX, DORADO_MODEL_VERSION};
    use super::DORADO_TAG;

    #[derive(Debug, Clone)]
    pub struct BasecallerConfig {
        pub emit_moves: bool,
        pub no_trim: bool,
        pub min_qscore: u8,
        pub device: Device,
        pub model_path: String,
        pub pod5: String,
        pub emit_fastq: bool,
        pub reference: Option<String>,
        pub kit_name: String,
        pub output: String,
    }

    #[derive(Debug, Clone)]
    pub struct DemuxConfig {
        pub input: String,
        pub output_dir: String,
        pub emit_fastq: bool,
        pub no_trim: bool,
    }

    fn base(subcommand: DoradoSubcommand) -> Vec<String> {
        let sub = match subcommand {
            DoradoSubcommand::Basecaller => "basecaller",
            DoradoSubcommand::Demux => "demux",
        };
        vec![DORADO_TAG.to_string(), sub.to_string()]
    }

    /// Path of the simplex model for the chosen accuracy.
    pub fn model_path(models_dir: &str, accuracy: Accuracy) -> String {
        format!(
            "{}/{}{}@{}",
            models_dir.trim_end_matches('/'),
            DORADO_MODEL_PREFIX,
            accuracy,
            DORADO_MODEL_VERSION
        )
    }

    pub fn basecaller_args(config: &BasecallerConfig) -> Vec<String> {
        let mut args_vec = base(DoradoSubcommand::Basecaller);
        if config.emit_moves {
            args_vec.push("--emit-moves".to_string());
        }
        if config.no_trim {
            args_vec.push("--no-trim".to_string());
        }
        args_vec.push("--min-qscore".to_string());
        args_vec.push(config.min_qscore.to_string());
        args_vec.push("--device".to_string());
        args_vec.push(config.device.to_string());
        args_vec.push(config.model_path.clone());
        args_vec.push(config.pod5.clone());
        if config.emit_fastq {
            args_vec.push("--emit-fastq".to_string());
        }
        if let Some(reference) = &config.reference {
            args_vec.push("--reference".to_string());
            args_vec.push(reference.clone());
        }
        args_vec.push("--kit-name".to_string());
        args_vec.push(config.kit_name.clone());
        args_vec.push(">".to_string());
        args_vec.push(config.output.clone());
        args_vec
    }

    pub fn demux_args(config: &DemuxConfig) -> Vec<String> {
        let mut args_vec = base(DoradoSubcommand::Demux);
        if config.emit_fastq {
            args_vec.push("--emit-fastq".to_string());
            args_vec.push("-o".to_string());
            args_vec.push(config.output_dir.clone());
        } else {
            args_vec.push("-o".to_string());
            args_vec.push(config.output_dir.clone());
            if config.no_trim {
                args_vec.push("--no-trim".to_string());
            }
            args_vec.push("--no-classify".to_string());
        }
        args_vec.push(config.input.clone());
        args_vec
    }
}


pub mod samtools {
    use super::SAMTOOLS_TAG;

    /// Flag bit for unmapped reads.
    pub const UNMAPPED_FLAG: u32 = 4;

    /// `samtools view` filters. Every field left at its default adds nothing
    /// to the command line.
    #[derive(Debug, Clone, Default)]
    pub struct ViewFilterConfig {
        pub input: String,
        pub output: String,
        pub min_mapq: u32,
        pub exclude_flags: Option<u32>,
        pub min_length: Option<u64>,
    }

    pub fn view_filter_args(config: &ViewFilterConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = vec![SAMTOOLS_TAG.to_string(), "view".to_string(), "-b".to_string()];
        if config.min_mapq > 0 {
            args_vec.push("-q".to_string());
            args_vec.push(config.min_mapq.to_string());
        }
        if let Some(flags) = config.exclude_flags {
            args_vec.push("-F".to_string());
            args_vec.push(flags.to_string());
        }
        if let Some(min_length) = config.min_length {
            args_vec.push("-e".to_string());
            args_vec.push(format!("'rlen > {}'", min_length));
        }
        args_vec.push(config.input.clone());
        args_vec.push(">".to_string());
        args_vec.push(config.output.clone());
        args_vec
    }

    /// Keeps header lines and every record whose CIGAR (column 6) has neither
    /// an insertion nor a deletion.
    pub fn indel_filter_args(input: &str, output: &str) -> Vec<String> {
        vec![
            SAMTOOLS_TAG.to_string(),
            "view".to_string(),
            "-h".to_string(),
            input.to_string(),
            "|".to_string(),
            "awk".to_string(),
            r#"'BEGIN{OFS="\t"} /^@/ {print $0} !/^@/ && $6 !~ /[ID]/ {print $0}'"#.to_string(),
            "|".to_string(),
            SAMTOOLS_TAG.to_string(),
            "view".to_string(),
            "-b".to_string(),
            "-o".to_string(),
            output.to_string(),
        ]
    }
}


pub mod remora {
    use crate::config::defs::{RemoraSubcommand, MOD_BASE_CODE, MOD_BASE_NAME};
    use super::REMORA_TAG;

    fn base(subcommand: RemoraSubcommand) -> Vec<String> {
        let sub: &[&str] = match subcommand {
            RemoraSubcommand::DatasetPrepare => &["dataset", "prepare"],
            RemoraSubcommand::DatasetMakeConfig => &["dataset", "make_config"],
            RemoraSubcommand::ModelTrain => &["model", "train"],
            RemoraSubcommand::InferFromPod5AndBam => &["infer", "from_pod5_and_bam"],
            RemoraSubcommand::AnalyzePlotRefRegion => &["analyze", "plot", "ref_region"],
        };
        let mut args_vec = vec![REMORA_TAG.to_string()];
        args_vec.extend(sub.iter().map(|s| s.to_string()));
        args_vec
    }

    /// Whether a prepared dataset holds control (canonical) or modified chunks.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum ChunkKind {
        Canonical,
        Modified,
    }

    #[derive(Debug, Clone)]
    pub struct PrepareConfig {
        pub pod5: String,
        pub bam: String,
        pub output_path: String,
        pub levels_table: String,
        pub motif: String,
        pub mod_num: usize,
        pub kind: ChunkKind,
        pub focus_bed: String,
    }

    pub fn prepare_args(config: &PrepareConfig) -> Vec<String> {
        let mut args_vec = base(RemoraSubcommand::DatasetPrepare);
        args_vec.extend([
            config.pod5.clone(),
            config.bam.clone(),
            "--output-path".to_string(),
            config.output_path.clone(),
            "--refine-kmer-level-table".to_string(),
            config.levels_table.clone(),
            "--refine-rough-rescale".to_string(),
            "--motif".to_string(),
            config.motif.clone(),
            config.mod_num.to_string(),
        ]);
        match config.kind {
            ChunkKind::Canonical => args_vec.push("--mod-base-control".to_string()),
            ChunkKind::Modified => {
                args_vec.push("--mod-base".to_string());
                args_vec.push(MOD_BASE_CODE.to_string());
                args_vec.push(MOD_BASE_NAME.to_string());
            }
        }
        args_vec.push("--focus-reference-positions".to_string());
        args_vec.push(config.focus_bed.clone());
        args_vec
    }

    pub fn make_config_args(config_path: &str, chunk_dirs: &[String], weights: &[u32], log_file: &str) -> Vec<String> {
        let mut args_vec = base(RemoraSubcommand::DatasetMakeConfig);
        args_vec.push(config_path.to_string());
        args_vec.extend(chunk_dirs.iter().cloned());
        args_vec.push("--dataset-weights".to_string());
        args_vec.extend(weights.iter().map(|w| w.to_string()));
        args_vec.push("--log-filename".to_string());
        args_vec.push(log_file.to_string());
        args_vec
    }

    #[derive(Debug, Clone)]
    pub struct TrainConfig {
        pub dataset_config: String,
        pub model_def: String,
        pub device: String,
        pub chunk_context: u32,
        pub output_path: String,
    }

    pub fn train_args(config: &TrainConfig) -> Vec<String> {
        let mut args_vec = base(RemoraSubcommand::ModelTrain);
        args_vec.extend([
            config.dataset_config.clone(),
            "--model".to_string(),
            config.model_def.clone(),
            "--device".to_string(),
            config.device.clone(),
            "--chunk-context".to_string(),
            config.chunk_context.to_string(),
            config.chunk_context.to_string(),
            "--output-path".to_string(),
            config.output_path.clone(),
        ]);
        args_vec
    }

    #[derive(Debug, Clone)]
    pub struct InferConfig {
        pub pod5: String,
        pub bam: String,
        pub model: String,
        pub out_bam: String,
        pub log_file: String,
        pub device: String,
    }

    pub fn infer_args(config: &InferConfig) -> Vec<String> {
        let mut args_vec = base(RemoraSubcommand::InferFromPod5AndBam);
        args_vec.extend([
            "--reference-anchored".to_string(),
            config.pod5.clone(),
            config.bam.clone(),
            "--model".to_string(),
            config.model.clone(),
            "--out-bam".to_string(),
            config.out_bam.clone(),
            "--log-filename".to_string(),
            config.log_file.clone(),
            "--device".to_string(),
            config.device.clone(),
        ]);
        args_vec
    }

    #[derive(Debug, Clone)]
    pub struct PlotConfig {
        pub can_pod5: String,
        pub can_bam: String,
        pub mod_pod5: String,
        pub mod_bam: String,
        pub ref_regions: String,
        pub highlight_ranges: String,
        pub levels_table: String,
        pub log_file: String,
    }

    pub fn plot_args(config: &PlotConfig) -> Vec<String> {
        let mut args_vec = base(RemoraSubcommand::AnalyzePlotRefRegion);
        args_vec.extend([
            "--pod5-and-bam".to_string(),
            config.can_pod5.clone(),
            config.can_bam.clone(),
            "--pod5-and-bam".to_string(),
            config.mod_pod5.clone(),
            config.mod_bam.clone(),
            "--ref-regions".to_string(),
            config.ref_regions.clone(),
            "--highlight-ranges".to_string(),
            config.highlight_ranges.clone(),
            "--refine-kmer-level-table".to_string(),
            config.levels_table.clone(),
            "--refine-rough-rescale".to_string(),
            "--log-filename".to_string(),
            config.log_file.clone(),
        ]);
        args_vec
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Accuracy, Device};

    #[test]
    fn test_dorado_model_path() {
        assert_eq!(
            dorado::model_path("/models/", Accuracy::Sup),
            "/models/dna_r10.4.1_e8.2_400bps_sup@v5.0.0"
        );
    }

    #[test]
    fn test_basecaller_full() {
        let config = dorado::BasecallerConfig {
            emit_moves: true,
            no_trim: true,
            min_qscore: 9,
            device: Device::CudaAll,
            model_path: "/m/model".to_string(),
            pod5: "pod5_dir".to_string(),
            emit_fastq: true,
            reference: Some("ref.fa".to_string()),
            kit_name: "SQK-NBD114-24".to_string(),
            output: "calls.fastq".to_string(),
        };
        assert_eq!(
            join_cli(&dorado::basecaller_args(&config)),
            "dorado basecaller --emit-moves --no-trim --min-qscore 9 --device cuda:all /m/model pod5_dir \
             --emit-fastq --reference ref.fa --kit-name SQK-NBD114-24 > calls.fastq"
        );
    }

    #[test]
    fn test_demux_variants() {
        let mut config = dorado::DemuxConfig {
            input: "calls.bam".to_string(),
            output_dir: "calls_demuxed".to_string(),
            emit_fastq: false,
            no_trim: true,
        };
        assert_eq!(
            join_cli(&dorado::demux_args(&config)),
            "dorado demux -o calls_demuxed --no-trim --no-classify calls.bam"
        );
        config.emit_fastq = true;
        assert_eq!(
            join_cli(&dorado::demux_args(&config)),
            "dorado demux --emit-fastq -o calls_demuxed calls.bam"
        );
    }

    #[test]
    fn test_samtools_view_plain_copy() {
        let config = samtools::ViewFilterConfig {
            input: "in.bam".to_string(),
            output: "out.bam".to_string(),
            ..Default::default()
        };
        assert_eq!(join_cli(&samtools::view_filter_args(&config)), "samtools view -b in.bam > out.bam");
    }

    #[test]
    fn test_samtools_view_all_filters() {
        let config = samtools::ViewFilterConfig {
            input: "in.bam".to_string(),
            output: "out.bam".to_string(),
            min_mapq: 20,
            exclude_flags: Some(samtools::UNMAPPED_FLAG),
            min_length: Some(500),
        };
        assert_eq!(
            join_cli(&samtools::view_filter_args(&config)),
            "samtools view -b -q 20 -F 4 -e 'rlen > 500' in.bam > out.bam"
        );
    }

    #[test]
    fn test_indel_filter() {
        let cmd = join_cli(&samtools::indel_filter_args("in.bam", "out.bam"));
        assert!(cmd.starts_with("samtools view -h in.bam | awk 'BEGIN{OFS=\"\\t\"}"));
        assert!(cmd.contains("$6 !~ /[ID]/"));
        assert!(cmd.ends_with("| samtools view -b -o out.bam"));
    }

    #[test]
    fn test_remora_prepare_kinds() {
        let mut config = remora::PrepareConfig {
            pod5: "p".to_string(),
            bam: "c.bam".to_string(),
            output_path: "can_G29_chunks".to_string(),
            levels_table: "sf/levels.txt".to_string(),
            motif: "TTAGGG".to_string(),
            mod_num: 3,
            kind: remora::ChunkKind::Canonical,
            focus_bed: "sf/focus_reference_positionsG29.bed".to_string(),
        };
        assert_eq!(
            join_cli(&remora::prepare_args(&config)),
            "remora dataset prepare p c.bam --output-path can_G29_chunks --refine-kmer-level-table sf/levels.txt \
             --refine-rough-rescale --motif TTAGGG 3 --mod-base-control \
             --focus-reference-positions sf/focus_reference_positionsG29.bed"
        );
        config.kind = remora::ChunkKind::Modified;
        assert!(join_cli(&remora::prepare_args(&config)).contains("--motif TTAGGG 3 --mod-base o 8oxoG --focus"));
    }

    #[test]
    fn test_remora_make_config() {
        let dirs = vec!["can_G29_chunks".to_string(), "8oxoG29_chunks".to_string()];
        assert_eq!(
            join_cli(&remora::make_config_args("train_dataset.jsn", &dirs, &[1, 1], "train_dataset.log")),
            "remora dataset make_config train_dataset.jsn can_G29_chunks 8oxoG29_chunks \
             --dataset-weights 1 1 --log-filename train_dataset.log"
        );
    }
}
