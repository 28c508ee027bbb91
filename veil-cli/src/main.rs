mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })?;

    let cli = Cli::parse();

    // Show veil info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("veil", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Transform {
            config,
            incremental,
            changes,
            dirs,
            jars,
            state,
        } => commands::transform::run(
            &commands::transform::TransformOptions {
                config: config.as_deref(),
                incremental: *incremental,
                changes: changes.as_deref(),
                dirs,
                jars,
                state: state.as_deref(),
            },
            &cli.global,
        ),
        Command::Generate { config, out } => {
            commands::generate::run(config.as_deref(), out, &cli.global)
        }
        Command::Inspect { path } => commands::inspect::run(path, &cli.global),
    }
}
