// src/bin/audioseg-cli.rs

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;

use audioseg::cli::{Cli, Command, OutMode, SegmentArgs, SummarizeArgs, ValidateArgs};
use audioseg::error::{Error as AudiosegError, ErrorKind, mark};
use audioseg::{config, deps, export, job, logging, run, summarize, validator};

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Command::CheckDeps(args) => run_check_deps(args.json, args.verbose, args.strict),
        Command::Segment(args) => run_segment(args),
        Command::Validate(args) => run_validate(args),
        Command::Summarize(args) => run_summarize(args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            let converted: AudiosegError = e.into();
            ExitCode::from(converted.exit_code() as u8)
        }
    }
}

fn run_check_deps(json: bool, verbose: bool, strict: bool) -> Result<ExitCode> {
    let report = deps::check_dependencies_with(strict);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", deps::render_text(&report, verbose));
    }
    Ok(if report.ok { ExitCode::SUCCESS } else { ExitCode::from(2) })
}

fn run_segment(args: SegmentArgs) -> Result<ExitCode> {
    let cli_args: Vec<String> = std::env::args().collect();
    let started_at = chrono::Utc::now();

    let effective_config = config::build_effective(args.config.as_deref(), &args.overrides)
        .context("failed to build effective configuration")?;

    let mut config_value = effective_config;
    if !args.strategy.is_empty() {
        config_value["strategy"] = serde_json::Value::String(args.strategy.clone());
    }
    config_value["auto_strategy"]["enabled"] = serde_json::Value::Bool(args.auto);
    if args.export_timeline {
        config_value["export"]["timeline"] = serde_json::Value::Bool(true);
    }
    if args.export_csv {
        config_value["export"]["csv"] = serde_json::Value::Bool(true);
    }
    if args.export_mask {
        config_value["export"]["mask"] = serde_json::Value::Bool(true);
    }
    if args.emit_wav {
        config_value["export"]["emit_wav"] = serde_json::Value::Bool(true);
    }

    if args.dump_effective_config {
        println!("{}", serde_json::to_string_pretty(&config_value)?);
        return Ok(ExitCode::SUCCESS);
    }

    if args.analyze && args.dry_run {
        return Err(mark(
            ErrorKind::InvalidArgument,
            anyhow::anyhow!("--analyze is incompatible with --dry-run"),
        ));
    }

    let mut params = run::resolve_job_params(config_value.clone());
    params.overwrite = args.overwrite;
    params.analyze_only = args.analyze;
    params.emit_segments_when_analyze_only = args.emit_segments;

    if params.post_params.pad_sec < 0.0 {
        return Err(mark(
            ErrorKind::InvalidArgument,
            anyhow::anyhow!("postprocess.pad_sec must be >= 0, got {}", params.post_params.pad_sec),
        ));
    }
    if params.post_params.max_seg_sec < params.post_params.min_seg_sec {
        return Err(mark(
            ErrorKind::InvalidArgument,
            anyhow::anyhow!(
                "postprocess.max_seg_sec ({}) must be >= postprocess.min_seg_sec ({})",
                params.post_params.max_seg_sec,
                params.post_params.min_seg_sec
            ),
        ));
    }

    let jobs = resolve_jobs(&args)?;
    if jobs.is_empty() {
        bail!("no jobs resolved from the given input");
    }

    let environment = environment_fingerprint();

    if args.dry_run {
        for j in &jobs {
            println!("{} -> {}", j.audio_path.display(), j.out_dir.display());
        }
        let finished_at = chrono::Utc::now();
        let (summary, manifest) = run::build_run_report(
            cli_args,
            started_at,
            finished_at,
            &params.config_value,
            environment,
            &jobs,
            None,
        );
        write_run_artifacts(&args.out_dir, &summary, &manifest)?;
        return Ok(ExitCode::SUCCESS);
    }

    let worker_count = args.jobs.unwrap_or_else(run::default_worker_count);
    let results = run::run_jobs(jobs.clone(), &params, worker_count);

    let mut failed = 0usize;
    for result in &results {
        match result {
            run::JobRunResult::Ok(outcome) => {
                println!(
                    "{}: {} segments ({})",
                    outcome.job_id,
                    outcome.segments.len(),
                    outcome.chosen_strategy.map(|s| s.to_string()).unwrap_or_default()
                );
                for warning in &outcome.warnings {
                    eprintln!("{}: warning: {warning}", outcome.job_id);
                }
            }
            run::JobRunResult::Err { job_id, audio_path, error } => {
                failed += 1;
                eprintln!("{job_id} ({}): failed: {error}", audio_path.display());
            }
        }
    }

    let finished_at = chrono::Utc::now();
    let (summary, manifest) = run::build_run_report(
        cli_args,
        started_at,
        finished_at,
        &params.config_value,
        environment,
        &jobs,
        Some(&results),
    );
    write_run_artifacts(&args.out_dir, &summary, &manifest)?;

    if args.validate_output {
        let validate_failed = validate_run_output(&jobs, false);
        if validate_failed > 0 && failed == 0 {
            failed = validate_failed;
        }
    }

    Ok(if failed > 0 { ExitCode::from(1) } else { ExitCode::SUCCESS })
}

/// Write `run_summary.json` and `run_manifest.json` at the common parent of all job outputs
/// (`--out`), once, after every job has either run or been planned.
fn write_run_artifacts(
    out_dir: &std::path::Path,
    summary: &audioseg::report::RunSummary,
    manifest: &audioseg::report::RunManifest,
) -> Result<()> {
    summary
        .write(&out_dir.join("run_summary.json"))
        .context("failed to write run_summary.json")?;
    manifest
        .write(&out_dir.join("run_manifest.json"))
        .context("failed to write run_manifest.json")?;
    Ok(())
}

/// Collapse a dependency probe plus the running toolchain/platform into the manifest's
/// reproducibility fingerprint.
fn environment_fingerprint() -> audioseg::report::EnvironmentFingerprint {
    let probe = deps::check_dependencies();
    let mut tool_versions = std::collections::BTreeMap::new();
    for tool in probe.tools {
        tool_versions.insert(tool.name, tool.version.unwrap_or_else(|| "not found".to_string()));
    }
    audioseg::report::EnvironmentFingerprint {
        language_runtime_version: format!("rustc {}", env!("CARGO_PKG_RUST_VERSION")),
        platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        deps: tool_versions,
    }
}

fn resolve_jobs(args: &SegmentArgs) -> Result<Vec<audioseg::model::Job>> {
    if let Some(file) = &args.input_file {
        return Ok(vec![job::resolve_file(file, &args.out_dir)?]);
    }
    if let Some(workdir) = &args.workdir {
        return Ok(vec![job::resolve_workdir(workdir, &args.out_dir)?]);
    }
    if let Some(root) = &args.root {
        let mirrors_structure = args.mirror || args.out_mode == OutMode::OutRoot;
        return job::resolve_root_filtered(root, mirrors_structure, &args.out_dir, args.pattern.as_deref());
    }
    if let Some(manifest) = &args.manifest {
        return job::resolve_manifest(manifest, &args.out_dir);
    }
    Err(mark(
        ErrorKind::InvalidArgument,
        anyhow::anyhow!("one of --in, --workdir, --root, or --manifest is required"),
    ))
}

/// Run the validator over every job's finished output and print a one-line verdict per job,
/// used by `--validate-output` once segmenting finishes. Returns the number of jobs that failed
/// validation so the caller can fold it into the process exit code.
fn validate_run_output(jobs: &[audioseg::model::Job], strict: bool) -> usize {
    let mut failed = 0usize;
    for j in jobs {
        let result = validator::validate_job(
            &j.job_id,
            &j.out_dir.join("segments.jsonl"),
            &j.out_dir.join("seg_report.json"),
            strict,
        );
        if !result.ok {
            failed += 1;
        }
        for err in &result.errors {
            eprintln!("{}: validate: error: {}", j.job_id, err.message);
        }
        for warning in &result.warnings {
            eprintln!("{}: validate: warning: {}", j.job_id, warning.message);
        }
    }
    failed
}

fn run_validate(args: ValidateArgs) -> Result<ExitCode> {
    let job_dirs = collect_job_dirs(&args.input)?;
    let mut results = Vec::new();
    let mut errors_so_far = 0usize;
    for dir in job_dirs {
        let job_id = dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        if let Some(pattern) = &args.pattern {
            if !job::glob_match(pattern, &job_id) {
                continue;
            }
        }
        if args.max_errors > 0 && errors_so_far >= args.max_errors {
            break;
        }
        let result = validator::validate_job(
            &job_id,
            &dir.join("segments.jsonl"),
            &dir.join("seg_report.json"),
            args.strict,
        );
        errors_so_far += result.errors.len();
        results.push(result);
    }
    let corpus = validator::CorpusValidation::from_results(results);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&corpus)?);
    } else {
        for result in &corpus.results {
            println!(
                "{}: {} ({} errors, {} warnings)",
                result.job_id,
                if result.ok { "ok" } else { "failed" },
                result.errors.len(),
                result.warnings.len()
            );
        }
        println!("{}/{} jobs ok", corpus.jobs_ok, corpus.jobs_checked);
    }

    Ok(ExitCode::from(corpus.exit_code() as u8))
}

fn run_summarize(args: SummarizeArgs) -> Result<ExitCode> {
    let job_dirs = collect_job_dirs(&args.input)?;
    let summaries: Vec<_> = job_dirs
        .iter()
        .map(|dir| {
            let job_id = dir
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| dir.display().to_string());
            let mut summary = summarize::summarize_file(&job_id, &dir.join("segments.jsonl"));
            summary.flag_counts = summarize::top_n_flag_counts(&summary.flag_counts, args.top_n);
            summary
        })
        .collect();
    let corpus = summarize::summarize_corpus(summaries);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&corpus)?);
    } else {
        for job_summary in &corpus.jobs {
            println!(
                "{}: {} segments, {:.3}s speech",
                job_summary.job_id, job_summary.segments_count, job_summary.speech_total_sec
            );
        }
        println!(
            "total: {} segments, {:.3}s speech across {} job(s)",
            corpus.total_segments,
            corpus.total_speech_sec,
            corpus.jobs.len()
        );
    }

    Ok(ExitCode::SUCCESS)
}

/// A directory is a job directory if it directly contains `segments.jsonl`; otherwise, scan its
/// immediate subdirectories for job directories (one level, matching the `--out` layout produced
/// by `--root --mirror`).
fn collect_job_dirs(input: &std::path::Path) -> Result<Vec<PathBuf>> {
    if input.join("segments.jsonl").is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut dirs = Vec::new();
    let entries = std::fs::read_dir(input)
        .with_context(|| format!("failed to read directory {}", input.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() && path.join("segments.jsonl").is_file() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}
