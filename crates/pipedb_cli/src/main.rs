use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use pipedb_core::{
    image::ImageReader, material::parse_define_arg, BuildConfig, PipelineDb, PipelineDbBuilder, PipelineView,
    StageFailurePolicy,
};

#[derive(Parser)]
#[command(name = "pipedb", about = "pipedb: pipeline database builder and inspector")]
struct Cli {
    /// Debug-level logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Compile material files into one database image
    Build {
        #[arg(required = true)]
        materials: Vec<PathBuf>,
        #[arg(short, long, default_value = "mat_out.bin")]
        out: PathBuf,
        /// JSON build config; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Drop a pipeline if any of its stages fails to compile
        #[arg(long, default_value_t = false)]
        reject_partial: bool,
        #[arg(long, value_name = "BYTES")]
        data_capacity: Option<usize>,
        /// Extra compiler definition for every stage
        #[arg(short = 'D', value_name = "NAME=VALUE")]
        define: Vec<String>,
    },

    /// Print the header and every record of a database
    Info {
        db: PathBuf,
    },

    /// Write one stage's bytecode to a file
    Extract {
        db: PathBuf,
        #[arg(long)]
        pipeline: String,
        #[arg(long)]
        stage: usize,
        #[arg(short, long)]
        out: PathBuf,
    },
}

fn build_config(
    config: Option<&Path>,
    reject_partial: bool,
    data_capacity: Option<usize>,
    define: &[String],
) -> Result<BuildConfig> {
    let mut cfg = match config {
        Some(p) => BuildConfig::load(p).with_context(|| format!("loading config {}", p.display()))?,
        None => BuildConfig::default(),
    };
    if reject_partial {
        cfg.stage_failure_policy = StageFailurePolicy::RejectPipeline;
    }
    if let Some(n) = data_capacity {
        cfg.data_capacity = n;
    }
    for d in define {
        cfg.definitions.push(parse_define_arg(d)?);
    }
    Ok(cfg)
}

fn print_record(idx: usize, offset: usize, rec: &PipelineView<'_>) {
    let st = rec.state();
    println!("[{idx}] {} @{offset} ({} bytes)", rec.name(), rec.total_size());
    println!("    renderpass={} vertex_input={}", rec.renderpass_name(), rec.vertex_input_name());
    println!(
        "    polygon_mode={} cull_mode={} topology={} depth_op={} depth_test={} depth_write={}",
        st.polygon_mode, st.cull_mode, st.topology, st.depth_op, st.depth_test, st.depth_write
    );
    for (i, s) in rec.stages().enumerate() {
        let kind = s.stage_kind().map(|k| k.label()).unwrap_or("unknown");
        let digest = rec
            .stage_bytes(i)
            .map(|b| hex::encode(blake3::hash(b).as_bytes()))
            .unwrap_or_default();
        println!("    stage {i}: {kind} offset={} size={} blake3={digest}", s.offset, s.size);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Cmd::Build { materials, out, config, reject_partial, data_capacity, define } => {
            let cfg = build_config(config.as_deref(), reject_partial, data_capacity, &define)?;
            let mut builder = PipelineDbBuilder::with_naga(cfg);
            for m in &materials {
                builder
                    .compile_material_file(m)
                    .with_context(|| format!("building {}", m.display()))?;
            }
            let diagnostics = builder.take_diagnostics();
            for d in &diagnostics {
                eprintln!("{d}");
            }
            let path = builder.dump_to_file(&out).with_context(|| format!("writing {}", out.display()))?;
            info!(materials = materials.len(), "build finished");
            println!(
                "wrote {} pipelines to {} ({} diagnostics)",
                builder.len(),
                path.display(),
                diagnostics.len()
            );
        }
        Cmd::Info { db } => {
            let bytes = std::fs::read(&db).with_context(|| format!("reading {}", db.display()))?;
            let reader = ImageReader::new(&bytes)?;
            let hdr = reader.header();
            println!("{}: total_size={} records={}", db.display(), hdr.total_size, hdr.record_count);
            for (idx, rec) in reader.records().enumerate() {
                let (offset, view) = rec?;
                print_record(idx, offset, &view);
            }
        }
        Cmd::Extract { db, pipeline, stage, out } => {
            let mut pdb = PipelineDb::new();
            pdb.load_file(&db).with_context(|| format!("loading {}", db.display()))?;
            let rec = pdb.find(&pipeline)?;
            let bytes = rec
                .stage_bytes(stage)
                .ok_or_else(|| anyhow!("{pipeline} has {} stages, no stage {stage}", rec.stage_count()))?;
            std::fs::write(&out, bytes).with_context(|| format!("writing {}", out.display()))?;
            println!("extracted {} bytes to {}", bytes.len(), out.display());
        }
    }
    Ok(())
}
