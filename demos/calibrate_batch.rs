//! Example: Rank segmentation parameter sets against annotated tracks
//!
//! Usage:
//!   cargo run --release --example calibrate_batch -- [--jobs N] [--json] <manifest.json>
//!
//! Manifest format:
//!
//! ```json
//! {
//!   "tracks": [{"path": "song.linear.json", "boundaries": [0.0, 31.5, 62.0]}],
//!   "candidates": [{"sensitivity": 1.0}, {"sensitivity": 2.0}],
//!   "options": {"tolerance_sec": 3.0, "probe_tracks": 3, "prune_floor": 0.2}
//! }
//! ```

use serde::Deserialize;
use std::env;
use std::time::Instant;
use stratum_structure::calibration::{calibrate, CalibrationOptions, ReferenceTrack};
use stratum_structure::{FeatureSequence, LinearAnalysis, SegmentationConfig};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestTrack {
    path: String,
    boundaries: Vec<f32>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    tracks: Vec<ManifestTrack>,
    candidates: Vec<SegmentationConfig>,
    #[serde(default)]
    options: CalibrationOptions,
}

fn load_track(t: &ManifestTrack) -> Result<ReferenceTrack, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(&t.path)?;
    let linear = LinearAnalysis::from_json(&json)?;
    Ok(ReferenceTrack {
        name: t.path.clone(),
        features: FeatureSequence::from_linear(&linear)?,
        boundaries: t.boundaries.clone(),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let mut args: Vec<String> = env::args().skip(1).collect();

    let mut json = false;
    let mut jobs: Option<usize> = None;
    let mut manifest_path: Option<String> = None;

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
            "--help" | "-h" => {
                eprintln!(
                    "Usage: calibrate_batch [--jobs N] [--json] <manifest.json>\n\
                     \n\
                     --jobs N   Parallel workers (default: CPU-1, or the manifest's options.jobs)\n\
                     --json     Emit one JSON object per candidate (JSONL)\n"
                );
                return Ok(());
            }
            _ => manifest_path = Some(a),
        }
    }

    let Some(manifest_path) = manifest_path else {
        eprintln!("ERROR: Provide a manifest path. Use --help for usage.");
        std::process::exit(2);
    };

    let manifest: Manifest = serde_json::from_str(&std::fs::read_to_string(&manifest_path)?)?;
    let mut options = manifest.options;
    if let Some(j) = jobs {
        options.jobs = j;
    }

    let mut tracks = Vec::with_capacity(manifest.tracks.len());
    for t in &manifest.tracks {
        match load_track(t) {
            Ok(track) => tracks.push(track),
            Err(e) => eprintln!("Skipping {}: {}", t.path, e),
        }
    }
    eprintln!(
        "Calibration: {} tracks, {} candidates, jobs={}",
        tracks.len(),
        manifest.candidates.len(),
        options.jobs
    );

    let t0 = Instant::now();
    let report = calibrate(&tracks, &manifest.candidates, &options)?;

    for r in &report.candidates {
        if json {
            println!("{}", serde_json::to_string(r)?);
        } else {
            println!(
                "candidate {:3}  F={:.3}  tracks={}  failures={}{}",
                r.candidate_index,
                r.mean_f_measure,
                r.tracks_evaluated,
                r.failures,
                if r.pruned { "  (pruned)" } else { "" }
            );
        }
    }
    if let Some(best) = report.best() {
        eprintln!(
            "Best: candidate {} (F={:.3}) in {:.2}s",
            best.candidate_index,
            best.mean_f_measure,
            t0.elapsed().as_secs_f32()
        );
        if !json {
            println!(
                "{}",
                serde_json::to_string_pretty(&manifest.candidates[best.candidate_index])?
            );
        }
    }
    Ok(())
}
