//! Example: Segment and chord-decode LinearAnalysis JSON files
//!
//! Usage:
//!   cargo run --release --example analyze_linear -- [--jobs N] [--json] [--config cfg.json] <file1> ...
//!
//! Notes:
//! - Parallelism is across files. Each file analysis is single-threaded.
//! - Default workers: (available CPU threads - 1).
//! - Set RUST_LOG=debug for per-stage logs.

use rayon::prelude::*;
use std::env;
use std::time::Instant;
use stratum_structure::calibration::default_jobs;
use stratum_structure::{analyze, AnalysisConfig, AnalysisOutput, FeatureSequence, LinearAnalysis};

fn analyze_file(path: &str, config: &AnalysisConfig) -> Result<AnalysisOutput, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(path)?;
    let linear = LinearAnalysis::from_json(&json)?;
    let seq = FeatureSequence::from_linear(&linear)?;
    Ok(analyze(&seq, config)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let mut args: Vec<String> = env::args().skip(1).collect();

    let mut json = false;
    let mut jobs: Option<usize> = None;
    let mut config_path: Option<String> = None;
    let mut paths: Vec<String> = Vec::new();

    while let Some(a) = args.first().cloned() {
        args.remove(0);
        match a.as_str() {
            "--json" => json = true,
            "--jobs" => {
                let v = args
                    .first()
                    .ok_or("--jobs requires a value")?
                    .parse::<usize>()?;
                args.remove(0);
                jobs = Some(std::cmp::max(1, v));
            }
            "--config" => {
                config_path = Some(args.first().ok_or("--config requires a path")?.clone());
                args.remove(0);
            }
            "--help" | "-h" => {
                eprintln!(
                    "Usage: analyze_linear [--jobs N] [--json] [--config cfg.json] <file1> <file2> ...\n\
                     \n\
                     --jobs N        Parallel workers (default: CPU-1)\n\
                     --json          Emit one JSON object per line (JSONL)\n\
                     --config PATH   AnalysisConfig JSON (unknown keys are rejected)\n"
                );
                return Ok(());
            }
            _ => paths.push(a),
        }
    }

    if paths.is_empty() {
        eprintln!("ERROR: Provide at least one LinearAnalysis JSON path. Use --help for usage.");
        std::process::exit(2);
    }

    let config = match &config_path {
        Some(p) => AnalysisConfig::from_json(&std::fs::read_to_string(p)?)?,
        None => AnalysisConfig::default(),
    };
    let jobs = jobs.unwrap_or_else(default_jobs);
    eprintln!("Batch: {} files, jobs={}", paths.len(), jobs);

    let t0 = Instant::now();
    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;

    let outs: Vec<(String, Result<AnalysisOutput, String>, f32)> = pool.install(|| {
        paths
            .par_iter()
            .map(|path| {
                let start = Instant::now();
                let result = analyze_file(path, &config).map_err(|e| e.to_string());
                (path.clone(), result, start.elapsed().as_secs_f32() * 1000.0)
            })
            .collect()
    });

    for (path, result, ms) in &outs {
        match result {
            Ok(output) if json => {
                let line = serde_json::json!({
                    "file": path,
                    "processing_time_ms": ms,
                    "analysis": output,
                });
                println!("{}", line);
            }
            Ok(output) => {
                println!("{}  ({:.1} ms)", path, ms);
                let key = output
                    .harmony
                    .key
                    .map(|k| k.name())
                    .unwrap_or_else(|| "-".to_string());
                println!("  key: {} ({:.2})", key, output.harmony.key_confidence);
                for (i, section) in output.structure.sections.iter().enumerate() {
                    println!(
                        "  [{}] {:7.2}s - {:7.2}s  {}",
                        i,
                        section.time_range.start_time,
                        section.time_range.end_time,
                        section.harmonic_dna.chords.join(" ")
                    );
                }
            }
            Err(e) if json => {
                println!("{}", serde_json::json!({ "file": path, "error": e }));
            }
            Err(e) => eprintln!("{}: ERROR {}", path, e),
        }
    }

    let failed = outs.iter().filter(|(_, r, _)| r.is_err()).count();
    eprintln!(
        "Done: {} ok, {} failed, {:.2}s total",
        outs.len() - failed,
        failed,
        t0.elapsed().as_secs_f32()
    );
    Ok(())
}
