//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and sets up logging
//! - parses CLI arguments
//! - dispatches to the run pipeline, the joint fit, the inspector or the demo
//!   generator
//! - prints reports and writes optional exports

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, DemoArgs, InspectArgs, JointArgs, RunArgs};
use crate::domain::{DemoConfig, JointConfig, RunConfig};
use crate::error::AppError;
use crate::io::{Group, result_file, write_bins_csv, write_result_json, write_store};

pub mod pipeline;

/// Entry point for the `xsec` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Joint(args) => handle_joint(args),
        Command::Inspect(args) => handle_inspect(args),
        Command::Demo(args) => handle_demo(args),
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second init (e.g. from tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let config = run_config_from_args(&args);
    let run = pipeline::run_analysis(&config)?;

    println!(
        "{}",
        crate::report::format_run_summary(&config, run.analysis.systematics(), run.fit.as_ref())
    );
    println!("{}", crate::report::format_bin_table(&run.bins));

    if let Some(path) = &config.export {
        let record = result_file(
            config.propagator,
            run.analysis.systematic_names(),
            &run.central,
            &run.total,
        )?;
        write_result_json(path, &record)?;
        tracing::info!(path = %path.display(), "wrote result JSON");
    }
    if let Some(path) = &config.export_csv {
        write_bins_csv(path, &run.bins)?;
        tracing::info!(path = %path.display(), "wrote per-bin CSV");
    }

    Ok(())
}

fn handle_joint(args: JointArgs) -> Result<(), AppError> {
    let config = JointConfig {
        analysis_path: args.analysis,
        groups: args.groups,
        include_stat: !args.no_stat,
        noise: args.noise,
        fixed: args.fix,
        masked_bins: args.mask_bin,
    };
    let fit = pipeline::run_joint(&config)?;
    println!("{}", crate::report::format_joint_summary(&config, &fit));
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<(), AppError> {
    let analysis = pipeline::load_analysis(&args.analysis, &args.group)?;
    println!("{}", crate::report::format_inspect(&analysis));
    Ok(())
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = DemoConfig {
        seed: args.seed,
        nbins: args.bins,
        universes: args.universes,
    };
    let analysis = crate::data::generate_demo(&config)?;

    let mut root = Group::new();
    analysis.save_to(&mut root, &args.group)?;
    write_store(&args.out, &root)?;
    tracing::info!(
        path = %args.out.display(),
        group = %args.group,
        systematics = analysis.systematics().len(),
        "saved demo analysis"
    );
    Ok(())
}

pub fn run_config_from_args(args: &RunArgs) -> RunConfig {
    RunConfig {
        analysis_path: args.analysis.clone(),
        group: args.group.clone(),
        propagator: args.propagator,
        include_stat: !args.no_stat,
        noise: args.noise,
        fixed: args.fix.clone(),
        masked_bins: args.mask_bin.clone(),
        export: args.export.clone(),
        export_csv: args.export_csv.clone(),
    }
}
