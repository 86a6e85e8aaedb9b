//! Finding the layer height a file was originally generated with (rescale mode).
//!
//! This is best effort. The heuristics run in a fixed order and the first one that produces a
//! positive height wins; later heuristics are never consulted to cross-check it.

use std::sync::LazyLock;

use regex::Regex;

use crate::line::{self, LineKind};
use crate::{LayerNumber, Mm};

/// Offered to the user when none of the heuristics work.
pub const DEFAULT_ORIGINAL_HEIGHT: Mm = 0.5;

// How far above a move we look for the layer marker it belongs to.
const MARKER_LOOKBACK_LINES: usize = 5;

// Without a marker, a lone Z is only believable as a first layer height if it's in this range.
const FIRST_LAYER_MIN: Mm = 0.01;
const FIRST_LAYER_MAX: Mm = 1.0;

// Written into the header by the Marlin-to-GRBL converter.
static HEIGHT_COMMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"; \(User-defined layer height for Z calculation: (?<height>\d+\.\d+)mm\)")
        .expect("height comment regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    HeaderComment,
    FirstLayerMove,
    FirstNonZeroZ { layer: LayerNumber },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Found {
    pub height: Mm,
    pub source: Source,
}

pub fn discover_original_height<S: AsRef<str>>(lines: &[S]) -> Option<Found> {
    let found = from_header_comment(lines)
        .or_else(|| from_first_layer_move(lines))
        .or_else(|| {
            log::warn!("no layer height comment and no G1 Z in layer 1; guessing from the first non-zero Z, which may be inaccurate");
            from_first_non_zero_z(lines)
        })?;
    log::debug!("original layer height {:.3}mm from {:?}", found.height, found.source);
    Some(found)
}

fn usable(height: Mm) -> bool {
    height > 0.0 && height.is_finite()
}

fn from_header_comment<S: AsRef<str>>(lines: &[S]) -> Option<Found> {
    lines.iter().find_map(|line| {
        let height: Mm = HEIGHT_COMMENT.captures(line.as_ref())?.name("height")?.as_str().parse().ok()?;
        usable(height).then_some(Found { height, source: Source::HeaderComment })
    })
}

// The first `G1 Z..` inside layer 1. The section ends at the next marker or a blank line.
fn from_first_layer_move<S: AsRef<str>>(lines: &[S]) -> Option<Found> {
    let mut in_first_layer = false;
    for line in lines {
        let line = line.as_ref();
        let kind = line::classify(line);
        if !in_first_layer {
            in_first_layer = kind == LineKind::LayerMarker(1);
            continue;
        }
        match kind {
            LineKind::Blank | LineKind::LayerMarker(_) => break,
            LineKind::Command if line.trim_start().starts_with("G1 Z") => {
                let first_z = line::words(line).find(|w| w.is_z());
                if let Some(height) = first_z.and_then(|w| w.value).filter(|h| usable(*h)) {
                    return Some(Found { height, source: Source::FirstLayerMove });
                }
            }
            _ => {}
        }
    }
    None
}

fn from_first_non_zero_z<S: AsRef<str>>(lines: &[S]) -> Option<Found> {
    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.as_ref().trim();
        if !(trimmed.starts_with("G0 ") || trimmed.starts_with("G1 ")) {
            continue;
        }
        let layer = nearby_layer(lines, index);
        for z in line::words(trimmed).filter_map(|w| w.z_value()) {
            if z <= 0.0 || !z.is_finite() {
                continue;
            }
            if layer > 0 {
                let height = z / layer as Mm;
                return Some(Found { height, source: Source::FirstNonZeroZ { layer } });
            }
            if FIRST_LAYER_MIN < z && z < FIRST_LAYER_MAX {
                return Some(Found { height: z, source: Source::FirstNonZeroZ { layer } });
            }
        }
    }
    None
}

// Layer number of the closest marker at most MARKER_LOOKBACK_LINES above `index`, or 0.
fn nearby_layer<S: AsRef<str>>(lines: &[S], index: usize) -> LayerNumber {
    let start = index.saturating_sub(MARKER_LOOKBACK_LINES);
    lines[start..=index]
        .iter()
        .rev()
        .find_map(|line| match line::classify(line.as_ref()) {
            LineKind::LayerMarker(layer) => Some(layer),
            _ => None,
        })
        .unwrap_or(0)
}
