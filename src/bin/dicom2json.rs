//! Command line entry point: converts one DICOM file and prints the JSON
//! document on stdout. Diagnostics go to stderr.

use std::path::PathBuf;

use clap::Parser;
use dicom2json::{convert_dicom, ConvertOptions};
use tracing_subscriber::EnvFilter;

/// Convert a DICOM image into a JSON document for the viewer
#[derive(Debug, Parser)]
#[command(name = "dicom2json", version, about)]
struct Cli {
    /// the DICOM file to convert
    file: Option<PathBuf>,

    /// frame to export from multi-frame images (0-based)
    #[arg(long, default_value_t = 0)]
    frame: u32,

    /// print single-line JSON instead of indented output
    #[arg(long)]
    compact: bool,

    /// verbose mode
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbose flag
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    let _ = tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .without_time()
            .with_level(false)
            .with_target(false)
            .finish(),
    );

    let Some(file) = cli.file else {
        // printed directly so a RUST_LOG filter cannot silence it
        eprintln!("❌ No DICOM file provided!");
        std::process::exit(1);
    };

    let options = ConvertOptions {
        frame_number: cli.frame,
        pretty: !cli.compact,
    };

    println!("{}", convert_dicom(&file, &options));
}
