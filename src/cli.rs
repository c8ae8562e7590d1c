//! Command-line surface: flag parsing only. Every subcommand's `Args` struct is mapped into a
//! library-level parameter type (kept in `run.rs`/`config.rs`/`job.rs`) before any work happens,
//! the same separation the rest of this crate draws between CLI wiring and engine logic.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "audioseg")]
#[command(about = "Deterministic, offline batch audio segmentation")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Raise the default log level to info (overridden by AUDIOSEG_LOG if set).
    #[arg(short = 'v', long = "verbose", global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Probe for ffmpeg/ffprobe and report whether the selected strategies can run.
    CheckDeps(CheckDepsArgs),
    /// Segment one audio file, a workdir, a directory tree, or a job-list manifest.
    Segment(SegmentArgs),
    /// Validate a job's (or a corpus's) segments.jsonl for internal consistency.
    Validate(ValidateArgs),
    /// Print aggregate statistics over one or more jobs' segments.jsonl.
    Summarize(SummarizeArgs),
}

#[derive(Parser, Debug)]
pub struct CheckDepsArgs {
    /// Emit the probe result as JSON instead of human-readable text.
    #[arg(long)]
    pub json: bool,

    /// Include notes/hints for tools that were found, not only missing ones.
    #[arg(long, default_value_t = false)]
    pub verbose: bool,

    /// Treat an ffmpeg build missing the silencedetect filter as a missing dependency.
    #[arg(long, default_value_t = false)]
    pub strict: bool,
}

#[derive(Parser, Debug)]
pub struct SegmentArgs {
    /// A single audio file to segment.
    #[arg(long = "in", group = "input")]
    pub input_file: Option<PathBuf>,

    /// A workdir containing audio.wav (and optionally meta.json).
    #[arg(long, group = "input")]
    pub workdir: Option<PathBuf>,

    /// A directory tree scanned recursively for workdirs.
    #[arg(long, group = "input")]
    pub root: Option<PathBuf>,

    /// A newline-delimited-JSON job-list file.
    #[arg(long, group = "input")]
    pub manifest: Option<PathBuf>,

    /// How output directories are laid out relative to `--out`: write directly into it
    /// (`in_place`, the default) or mirror the input tree's relative structure under it
    /// (`out_root`, only meaningful with `--root`).
    #[arg(long = "out-mode", value_enum, default_value_t = OutMode::InPlace)]
    pub out_mode: OutMode,

    /// Deprecated alias for `--out-mode out_root`.
    #[arg(long, default_value_t = false, hide = true)]
    pub mirror: bool,

    /// Only process workdirs/files whose name matches this glob (only meaningful with `--root`).
    #[arg(long)]
    pub pattern: Option<String>,

    /// Output directory (or output root, with `--root`/`--manifest`).
    #[arg(long = "out", required = true)]
    pub out_dir: PathBuf,

    /// JSON or YAML configuration file, merged over the built-in defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override one dotted config key, e.g. `--set postprocess.pad_sec=0.2`. Repeatable.
    #[arg(long = "set", value_parser = parse_key_value)]
    pub overrides: Vec<(String, String)>,

    /// Detection strategy to use when auto-strategy is not enabled.
    #[arg(long, default_value = "silence")]
    pub strategy: String,

    /// Try each strategy in order until one satisfies the quality gate.
    #[arg(long = "auto-strategy", visible_alias = "auto", default_value_t = false)]
    pub auto: bool,

    /// Number of worker threads; defaults to the number of logical CPUs.
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Run strategy analysis only: write the detector artifact and the analysis-phase report,
    /// but stop before postprocess/segment building (combine with `--emit-segments` to also
    /// build and write `segments.jsonl`). Incompatible with `--dry-run`.
    #[arg(long, default_value_t = false)]
    pub analyze: bool,

    /// Force writing `segments.jsonl` even when `--analyze` is set.
    #[arg(long, default_value_t = false)]
    pub emit_segments: bool,

    /// Resolve jobs and print what would run without writing any output.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Run the validator over each job's output once segmenting finishes, surfacing violations.
    #[arg(long, default_value_t = false)]
    pub validate_output: bool,

    /// Print the fully merged effective configuration as JSON and exit without running any job.
    #[arg(long, default_value_t = false)]
    pub dump_effective_config: bool,

    /// Extract a `segments/seg_NNNNNN.wav` clip per emitted segment.
    #[arg(long, default_value_t = false)]
    pub emit_wav: bool,

    /// Allow writing into a job output directory that already has a `segments.jsonl`.
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Emit timeline.json for each job.
    #[arg(long, default_value_t = false)]
    pub export_timeline: bool,

    /// Emit segments.csv for each job.
    #[arg(long, default_value_t = false)]
    pub export_csv: bool,

    /// Emit mask.json for each job.
    #[arg(long, default_value_t = false)]
    pub export_mask: bool,
}

/// How job output directories are laid out relative to `--out`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutMode {
    InPlace,
    OutRoot,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// A job output directory, or a directory tree of job output directories.
    #[arg(long = "in", required = true)]
    pub input: PathBuf,

    /// Treat warnings as errors.
    #[arg(long, default_value_t = false)]
    pub strict: bool,

    /// Stop checking further jobs once this many errors have been recorded (0 = unlimited).
    #[arg(long, default_value_t = 0)]
    pub max_errors: usize,

    /// Only check job directories whose name matches this glob.
    #[arg(long)]
    pub pattern: Option<String>,

    /// Emit the result as JSON instead of human-readable text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct SummarizeArgs {
    /// A job output directory, or a directory tree of job output directories.
    #[arg(long = "in", required = true)]
    pub input: PathBuf,

    /// Number of entries to keep in each job's flag histogram.
    #[arg(long, default_value_t = 10)]
    pub top_n: usize,

    /// Emit the result as JSON instead of human-readable text.
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_key_value_splits_on_first_equals() {
        assert_eq!(
            parse_key_value("postprocess.pad_sec=0.2").unwrap(),
            ("postprocess.pad_sec".to_string(), "0.2".to_string())
        );
    }

    #[test]
    fn parse_key_value_rejects_missing_equals() {
        assert!(parse_key_value("no-equals-here").is_err());
    }

    #[test]
    fn segment_subcommand_parses_minimal_invocation() {
        let cli = Cli::parse_from([
            "audioseg",
            "segment",
            "--in",
            "a.wav",
            "--out",
            "out/",
        ]);
        match cli.command {
            Command::Segment(args) => {
                assert_eq!(args.input_file, Some(PathBuf::from("a.wav")));
                assert_eq!(args.out_dir, PathBuf::from("out/"));
                assert!(!args.auto);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
