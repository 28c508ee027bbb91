use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// veil - build-time string literal obfuscation for JVM class files
#[derive(Debug, Parser)]
#[command(name = "veil", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one transform pass over class directories and archives.
    Transform {
        /// JSON configuration file. Defaults apply when omitted.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Only process the entries listed in the change set.
        #[arg(long)]
        incremental: bool,

        /// JSON change set: a list of {"path": ..., "status": "added|changed|removed"}.
        #[arg(long, value_name = "FILE", requires = "incremental")]
        changes: Option<PathBuf>,

        /// Class directory input, as IN=OUT.
        #[arg(long = "dir", value_name = "IN=OUT")]
        dirs: Vec<String>,

        /// Archive input, as IN=OUT.
        #[arg(long = "jar", value_name = "IN=OUT")]
        jars: Vec<String>,

        /// File holding the configuration fingerprint between runs.
        #[arg(long, value_name = "FILE")]
        state: Option<PathBuf>,
    },

    /// Write the decoder class for a configuration.
    Generate {
        /// JSON configuration file. Defaults apply when omitted.
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Directory receiving veil/runtime/Veil.class.
        #[arg(short, long, value_name = "DIR")]
        out: PathBuf,
    },

    /// List the rewritable literals of a class file.
    Inspect {
        /// Path to the class file.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}
