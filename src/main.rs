extern crate simdeum;

use clap::Parser;
use simdeum::output::FileOutput;
use simdeum::{run_project, ProjectFlags, RunOverrides};
use std::ffi::OsStr;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser, Default, Debug)]
#[clap(author, version, about, long_about = None)]
struct SimdeumArgs {
    input_file: String,
    #[arg(long, short, help = "Directory to write results to, defaults to that of the input file")]
    output_dir: Option<PathBuf>,
    #[arg(long, short, help = "Seed for the random number generator")]
    seed: Option<u64>,
    #[arg(long, short, help = "Number of days to simulate, overriding the input")]
    days: Option<usize>,
    #[arg(long, short, help = "Number of pattern replicates, overriding the input")]
    patterns: Option<usize>,
    #[clap(long, default_value_t = false, help = "Simulate wastewater discharge")]
    discharge: bool,
    #[clap(long, default_value_t = false, help = "Carry uses past midnight into the next day")]
    spillover: bool,
    #[clap(long, default_value_t = false, help = "Use weekend statistics for weekend days")]
    weekend: bool,
    #[clap(long, default_value_t = false, help = "Skip writing per-event files")]
    no_events: bool,
    #[clap(long, default_value_t = false, help = "Whether to log out spans")]
    log_spans: bool,
}

impl From<&SimdeumArgs> for ProjectFlags {
    fn from(args: &SimdeumArgs) -> Self {
        let mut flags = ProjectFlags::empty();
        flags.set(ProjectFlags::SIMULATE_DISCHARGE, args.discharge);
        flags.set(ProjectFlags::SPILLOVER, args.spillover);
        flags.set(ProjectFlags::INCLUDE_WEEKEND, args.weekend);
        flags.set(ProjectFlags::SKIP_EVENT_OUTPUT, args.no_events);
        flags
    }
}

fn main() -> anyhow::Result<()> {
    let args = SimdeumArgs::parse();

    let subscriber = tracing_subscriber::fmt::fmt().with_max_level(tracing::Level::INFO);
    if args.log_spans {
        tracing::subscriber::set_global_default(subscriber.with_span_events(FmtSpan::CLOSE).finish())?;
    } else {
        tracing::subscriber::set_global_default(subscriber.finish())?;
    }

    let input_file = Path::new(args.input_file.as_str());
    let input_file_stem = input_file
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("simdeum");
    let output_dir = args.output_dir.clone().unwrap_or_else(|| {
        input_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
            .join(format!("{input_file_stem}__results"))
    });
    let output = FileOutput::new(output_dir.clone(), format!("{input_file_stem}__{{}}.csv"));

    let overrides = RunOverrides {
        seed: args.seed,
        days: args.days,
        patterns: args.patterns,
    };
    let project_flags: ProjectFlags = (&args).into();

    let results = run_project(
        BufReader::new(File::open(input_file)?),
        &output,
        &overrides,
        &project_flags,
    )?;

    info!(
        houses = results.len(),
        "wrote results to {}",
        output_dir.display()
    );

    Ok(())
}
