//! Signforge command-line interface.
//!
//! Three subcommands:
//! - `generate` runs the full prompt-to-mesh pipeline and reports the outcome
//! - `inspect` prints the integrity report for an existing STL file
//! - `init` writes a commented default `signforge.yaml`
//!
//! Verbosity follows `RUST_LOG` (default `info`). The backend credential is
//! read from `SIGNFORGE_API_KEY` and never echoed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use signforge_core::{
    AcceptedRun, ApiKey, AttemptRecord, CancellationHandle, GenerationRequest,
    HttpGenerationBackend, ImageSize, LatticeExtruder, PaletteTracer, Pipeline, PipelineConfig,
    PipelineResult, Prompt, QualityTier, RejectedRun, StageSet, Style, WeldRepairer,
};
use signforge_critics::stl;

const CONFIG_FILE: &str = "signforge.yaml";
const API_KEY_VAR: &str = "SIGNFORGE_API_KEY";

#[derive(Parser)]
#[command(name = "signforge")]
#[command(about = "Turn a short text prompt into a 3D-printable sign mesh")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a printable sign mesh from a text prompt
    Generate {
        /// Sign text (1-50 characters)
        prompt: String,

        /// Visual style: modern, classic, or playful
        #[arg(long)]
        style: Option<Style>,

        /// Generated image size: 1024x1024, 1792x1024, or 1024x1792
        #[arg(long)]
        size: Option<ImageSize>,

        /// Backend quality tier: standard or hd
        #[arg(long)]
        quality: Option<QualityTier>,

        /// Configuration file (default: signforge.yaml in the current directory)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Artifact directory, overriding the configured storage root
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the integrity report for an STL mesh
    Inspect {
        /// Path to a binary STL file
        mesh: PathBuf,

        /// Configuration file (supplies the printer build volume)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write a commented default signforge.yaml to the current directory
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            prompt,
            style,
            size,
            quality,
            config,
            output,
        } => {
            let accepted = run_generate(prompt, style, size, quality, config, output).await?;
            if !accepted {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Inspect { mesh, config } => run_inspect(&mesh, config),
        Commands::Init { force } => run_init(force),
    }
}

fn load_config(path: Option<PathBuf>) -> Result<PipelineConfig> {
    let path = path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
    let mut config = PipelineConfig::load_or_default(&path)?;
    let base = std::env::current_dir().context("Failed to resolve current directory")?;
    config.resolve_paths(&base);
    Ok(config)
}

async fn run_generate(
    prompt: String,
    style: Option<Style>,
    size: Option<ImageSize>,
    quality: Option<QualityTier>,
    config_path: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<bool> {
    let mut config = load_config(config_path)?;
    if let Some(root) = output {
        config.storage.root = root;
    }

    let api_key = std::env::var(API_KEY_VAR)
        .map(ApiKey::new)
        .map_err(|_| anyhow!("{API_KEY_VAR} is not set; export it to reach the image backend"))?;

    let prompt = Prompt::new(&prompt)?;
    let mut request = GenerationRequest::new(prompt);
    request.style = style;
    request.size = size;
    request.quality = quality;

    let backend = HttpGenerationBackend::new(&config.backend, api_key)?;
    let stages = StageSet::new(
        Arc::new(backend),
        Arc::new(PaletteTracer::new(config.vectorize.max_regions)),
        Arc::new(LatticeExtruder),
        Arc::new(WeldRepairer),
    );
    let pipeline = Pipeline::new(config, stages)?;

    // First Ctrl-C stops the run after the stage in flight; a second one
    // falls through to the default handler and kills the process.
    let cancel = CancellationHandle::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current stage");
            handle.cancel();
        }
    });

    match pipeline.run_with_cancellation(&request, &cancel).await {
        PipelineResult::Accepted(run) => {
            print_accepted(&run);
            Ok(true)
        }
        PipelineResult::Rejected(run) => {
            print_rejected(&run);
            Ok(false)
        }
        PipelineResult::Cancelled(run) => {
            println!("Run {} cancelled", run.run_id);
            print_attempts(run.trail.records());
            Ok(false)
        }
    }
}

fn print_accepted(run: &AcceptedRun) {
    println!("Run {} accepted", run.run_id);
    println!("==============================================");
    println!("Artifacts:");
    println!("  mesh:     {}", run.artifacts.mesh_path.display());
    println!("  image:    {}", run.artifacts.image_path.display());
    println!("  metadata: {}", run.artifacts.metadata_path.display());
    println!();
    println!("Checkpoints:");
    for (name, score) in &run.metadata.checkpoints {
        println!(
            "  {:<8} {:.3} (threshold {:.2})",
            name, score.overall, score.threshold
        );
    }
    println!();
    print_attempts(run.trail.records());
    println!();
    println!("Total: {} ms", run.metadata.total_elapsed_ms);
}

fn print_rejected(run: &RejectedRun) {
    println!("Run {} rejected", run.run_id);
    println!("==============================================");
    println!("  kind:   {}", run.kind);
    println!("  reason: {}", run.reason);
    println!();
    print_attempts(run.trail.records());
}

fn print_attempts(records: &[AttemptRecord]) {
    println!("Attempts:");
    for record in records {
        let stage = record.stage.to_string();
        let outcome = match record.outcome.failure() {
            None => "ok".to_string(),
            Some(failure) => failure.kind.to_string(),
        };
        let score = match &record.score {
            Some(score) => format!("  score {:.3}", score.overall),
            None => String::new(),
        };
        println!(
            "  {stage:<13} #{} {:>6} ms  {outcome}{score}",
            record.attempt, record.elapsed_ms
        );
    }
}

fn run_inspect(mesh_path: &Path, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path)?;
    let bytes = std::fs::read(mesh_path)
        .with_context(|| format!("Failed to read {}", mesh_path.display()))?;
    let mesh = stl::from_stl_bytes(&bytes)
        .with_context(|| format!("Failed to parse {}", mesh_path.display()))?;
    let report = mesh.inspect(config.build_volume.as_mm());

    let [x, y, z] = report.dimensions;
    let [bx, by, bz] = config.build_volume.as_mm();
    println!("Mesh report: {}", mesh_path.display());
    println!("==============================================");
    println!("  vertices:          {}", report.vertex_count);
    println!("  faces:             {}", report.face_count);
    println!("  dimensions:        {x:.2} x {y:.2} x {z:.2} mm");
    println!(
        "  watertight:        {} ({} boundary edges)",
        yes_no(report.watertight),
        report.boundary_edges
    );
    println!(
        "  manifold:          {} ({} non-manifold edges)",
        yes_no(report.manifold),
        report.nonmanifold_edges
    );
    println!(
        "  fits build volume: {} ({bx:.0} x {by:.0} x {bz:.0} mm)",
        yes_no(report.fits_volume)
    );
    println!("  degenerate faces:  {}", report.degenerate_faces);
    println!("  surface area:      {:.1} mm^2", report.surface_area);
    println!("  volume:            {:.1} mm^3", report.volume);
    println!();
    println!("printable: {}", yes_no(report.is_printable()));
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn run_init(force: bool) -> Result<()> {
    let path = PathBuf::from(CONFIG_FILE);
    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (pass --force to overwrite)",
            path.display()
        ));
    }

    let body = PipelineConfig::default().to_yaml()?;
    let content = format!(
        "# Signforge pipeline configuration.\n\
         #\n\
         # Every key is optional; omitted keys keep the built-in defaults shown\n\
         # here. Gate weights must sum to 1.0 per checkpoint, and hard_gates may\n\
         # only name metrics that checkpoint produces.\n\
         #\n\
         # The backend credential is never read from this file. Export\n\
         # {API_KEY_VAR} instead.\n\n{body}"
    );
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Wrote {}", path.display());
    println!("Next: export {API_KEY_VAR} and run `signforge generate \"YOUR TEXT\"`");
    Ok(())
}
