use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gcode_relayer_lib::{self as gr, origin, BlockGrowth, LayerHeightRule, Mm, Overrides};

#[derive(Parser, Debug)]
#[command(name = "gcode_relayer")]
#[command(about = "Rewrite the layer heights of layered G-code", long_about = None)]
struct Cli {
    /// Log filter (error, warn, info, debug, trace); falls back to RUST_LOG, then info
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-plan Z so the layer height changes by a fixed amount every block of layers
    Variable {
        /// G-code file with '; (--- Layer N' comments
        input: PathBuf,
        /// Layers per block (a)
        #[arg(short = 'a', long)]
        layers_per_block: u32,
        /// Layer height of the first block in mm (h)
        #[arg(short = 'H', long)]
        initial_height: Mm,
        /// Change of layer height per block in mm, may be negative (d)
        #[arg(short = 'd', long, allow_negative_numbers = true)]
        delta: Mm,
        /// Output path (default: <h>_<d>_<name>.nc next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Scale every Z from the file's original layer height to a new one
    Rescale {
        /// G-code file with '; (--- Layer N' comments
        input: PathBuf,
        /// New layer height in mm
        #[arg(short = 'H', long)]
        height: Mm,
        /// Original layer height in mm (default: detected from the file)
        #[arg(long)]
        original_height: Option<Mm>,
        /// Use the default original height without asking if it can't be detected
        #[arg(short, long)]
        yes: bool,
        /// Output path (default: <height>_<name> next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logger(level: Option<&str>) {
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    builder.filter_level(log::LevelFilter::Info);
    match level {
        Some(level) => {
            builder.parse_filters(level);
        }
        None => {
            if let Ok(level) = std::env::var("RUST_LOG") {
                builder.parse_filters(&level);
            }
        }
    }
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {}: {}",
            buf.timestamp_millis(),
            record.level(),
            record.module_path().unwrap_or(record.target()),
            record.args()
        )
    });
    if let Err(err) = builder.try_init() {
        eprintln!("failed to initialize logger: {}", err);
    }
}

fn confirm_default_original_height() -> Result<bool> {
    print!(
        "use default original layer height {}mm? (y/n): ",
        origin::DEFAULT_ORIGINAL_HEIGHT
    );
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}

fn run_rule(input: &Path, rule: LayerHeightRule, overrides: Overrides) -> Result<gr::Outcome> {
    gr::process_file(input, &rule, &overrides)
        .with_context(|| format!("processing {}", input.display()))
}

fn rescale(input: &Path, height: Mm, overrides: Overrides, yes: bool) -> Result<Option<gr::Outcome>> {
    let rule = LayerHeightRule::Rescale { new_height: height };
    match gr::process_file(input, &rule, &overrides) {
        Err(gr::Error::OriginalHeightUnknown) => {
            log::warn!("{}", gr::Error::OriginalHeightUnknown);
            if !yes && !confirm_default_original_height()? {
                return Ok(None);
            }
            log::info!("using default original layer height {}mm", origin::DEFAULT_ORIGINAL_HEIGHT);
            let overrides = Overrides { original_height: Some(origin::DEFAULT_ORIGINAL_HEIGHT), ..overrides };
            run_rule(input, rule, overrides).map(Some)
        }
        result => result
            .map(Some)
            .with_context(|| format!("processing {}", input.display())),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.log_level.as_deref());

    let outcome = match cli.command {
        Command::Variable { input, layers_per_block, initial_height, delta, output } => {
            let rule = LayerHeightRule::BlockGrowth(BlockGrowth {
                layers_per_block,
                initial_height,
                delta_per_block: delta,
            });
            Some(run_rule(&input, rule, Overrides { output, original_height: None })?)
        }
        Command::Rescale { input, height, original_height, yes, output } => {
            rescale(&input, height, Overrides { output, original_height }, yes)?
        }
    };

    match outcome {
        Some(outcome) => println!("done: {}", outcome.output.display()),
        None => println!("aborted, nothing written"),
    }
    Ok(())
}
