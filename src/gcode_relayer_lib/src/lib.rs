//! Rewrites the Z heights of layered G-code.
//!
//! Layers are recognized only by `; (--- Layer N ...` comments. Every parseable `Z` token after
//! the first layer marker is replaced according to a [`LayerHeightRule`]: either a fresh
//! cumulative plan where the layer height changes block by block, or a proportional rescale from
//! the file's original layer height. The last Z in the file (normally the final lift) is never
//! touched.
//!
//! The whole file is held in memory; the pipeline is count layers -> plan -> find terminal Z ->
//! rewrite -> write.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub mod error;
pub mod line;
pub mod naming;
pub mod origin;
pub mod plan;
pub mod rewrite;

pub use error::{Error, Result};
pub use plan::{BlockGrowth, LayerHeightRule, ZPlan};
pub use rewrite::{Rewritten, Sentinel};

// Millimetres along any axis, and 1-indexed layer numbers from the markers.
pub type Mm = f64;
pub type LayerNumber = u32;

// anything else gets a warning, not an error
pub const GCODE_EXTENSIONS: [&str; 4] = ["nc", "gcode", "gco", "txt"];

#[derive(Debug, Default, Clone)]
pub struct Overrides {
    // instead of the name derived from the input and the rule
    pub output: Option<PathBuf>,
    // rescale only; skips original height discovery
    pub original_height: Option<Mm>,
}

/// Highest layer number announced by any marker, or 0 if there are none.
pub fn count_layers<S: AsRef<str>>(lines: &[S]) -> LayerNumber {
    lines
        .iter()
        .filter_map(|l| match line::classify(l.as_ref()) {
            line::LineKind::LayerMarker(layer) => Some(layer),
            _ => None,
        })
        .max()
        .unwrap_or(0)
}

#[derive(Debug)]
pub struct Relayered<'a> {
    pub total_layers: LayerNumber,
    pub plan: ZPlan,
    pub sentinel: Option<Sentinel>,
    pub rewritten: Rewritten<'a>,
}

// Same as process_file, minus the IO.
pub fn relayer_lines<'a, S: AsRef<str>>(
    lines: &'a [S],
    rule: &LayerHeightRule,
    original_height: Option<Mm>,
) -> Result<Relayered<'a>> {
    let total_layers = count_layers(lines);
    if total_layers == 0 {
        return Err(Error::NoLayers);
    }
    log::info!("total layers: {}", total_layers);

    let original_height = match rule {
        LayerHeightRule::Rescale { .. } => original_height.or_else(|| {
            origin::discover_original_height(lines).map(|found| found.height)
        }),
        LayerHeightRule::BlockGrowth(_) => None,
    };
    let plan = plan::plan(total_layers, rule, original_height)?;

    let sentinel = rewrite::locate_terminal_z(lines);
    match sentinel {
        Some(s) => log::info!(
            "leaving the last Z alone: line {} '{}'",
            s.line + 1,
            lines[s.line].as_ref().trim()
        ),
        None => log::info!("no Z command found to keep as the last Z"),
    }

    let rewritten = rewrite::rewrite_lines(lines, &plan, total_layers, sentinel);
    Ok(Relayered { total_layers, plan, sentinel, rewritten })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub output: PathBuf,
    pub total_layers: LayerNumber,
    pub rewritten_lines: usize,
    pub rewritten_tokens: usize,
}

pub fn has_gcode_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| GCODE_EXTENSIONS.iter().any(|known| e.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Reads `input`, rewrites it per `rule`, and writes the result.
///
/// Nothing is written unless the whole file was processed; a failed write may leave a partial
/// output file behind.
pub fn process_file(input: &Path, rule: &LayerHeightRule, overrides: &Overrides) -> Result<Outcome> {
    if !has_gcode_extension(input) {
        log::warn!(
            "'{}' doesn't have a usual G-code extension ({}); processing it anyway",
            input.display(),
            GCODE_EXTENSIONS.join(", ")
        );
    }

    let before = Instant::now();
    let text = fs::read_to_string(input).map_err(|source| Error::Read { path: input.to_owned(), source })?;
    // keep terminators so untouched lines round-trip exactly
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    log::info!("read {} lines from {}", lines.len(), input.display());

    let relayered = relayer_lines(&lines, rule, overrides.original_height)?;

    let output = overrides.output.clone().unwrap_or_else(|| naming::output_filename(input, rule));
    write_lines(&output, &relayered.rewritten.lines)?;
    log::info!(
        "wrote {} - rewrote {} Z values on {} lines, elapsed: {:.2?}",
        output.display(),
        relayered.rewritten.rewritten_tokens,
        relayered.rewritten.rewritten_lines,
        before.elapsed()
    );

    Ok(Outcome {
        output,
        total_layers: relayered.total_layers,
        rewritten_lines: relayered.rewritten.rewritten_lines,
        rewritten_tokens: relayered.rewritten.rewritten_tokens,
    })
}

fn write_lines<S: AsRef<str>>(path: &Path, lines: &[S]) -> Result<()> {
    let write = || -> io::Result<()> {
        let mut buf_writer = io::BufWriter::with_capacity(8 * 1024, fs::File::create(path)?);
        for line in lines {
            buf_writer.write_all(line.as_ref().as_bytes())?;
        }
        buf_writer.flush()
    };
    write().map_err(|source| Error::Write { path: path.to_owned(), source })
}
