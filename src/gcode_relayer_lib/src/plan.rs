//! Per-layer Z targets.
//!
//! Block-growth rules become a [`TargetZTable`]: a strict running sum of per-layer heights,
//! one entry per layer. Rescale rules don't need a table; each existing Z is scaled by
//! `new_height / original_height` on the fly.

use std::fmt::Write as fmt_Write;

use crate::error::{Error, Result};
use crate::{LayerNumber, Mm};

// Heights at or below zero are replaced with this, so Z never goes backwards.
pub const MIN_LAYER_HEIGHT: Mm = 0.001;

// Far beyond any real print; a marker claiming more is treated as corrupt input.
pub const MAX_LAYERS: LayerNumber = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerHeightRule {
    /// Every Z is scaled proportionally from the file's original layer height to `new_height`.
    Rescale { new_height: Mm },
    BlockGrowth(BlockGrowth),
}

/// Layers come in blocks of `layers_per_block`; block `b` (0-indexed) prints at
/// `initial_height + b * delta_per_block`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockGrowth {
    pub layers_per_block: LayerNumber,
    pub initial_height: Mm,
    pub delta_per_block: Mm,
}

impl BlockGrowth {
    pub fn block_of(&self, layer: LayerNumber) -> LayerNumber {
        (layer - 1) / self.layers_per_block
    }

    // can be zero or negative with a negative delta
    pub fn raw_height(&self, block: LayerNumber) -> Mm {
        self.initial_height + block as Mm * self.delta_per_block
    }

    pub fn height(&self, block: LayerNumber) -> Mm {
        let h = self.raw_height(block);
        if h <= 0.0 {
            MIN_LAYER_HEIGHT
        } else {
            h
        }
    }

    /// First block (1-indexed, for messages) whose height is projected to reach zero, if that
    /// happens before the last block of a `total_layers` print.
    pub fn projected_zero_block(&self, total_layers: LayerNumber) -> Option<u64> {
        if self.delta_per_block >= 0.0 {
            return None;
        }
        let blocks_before_zero = -self.initial_height / self.delta_per_block;
        let block_count = total_layers as Mm / self.layers_per_block as Mm;
        if blocks_before_zero < block_count {
            Some(blocks_before_zero as u64 + 1)
        } else {
            None
        }
    }

    fn validate(&self) -> Result<()> {
        if self.layers_per_block == 0 {
            return Err(Error::InvalidRule("layers per block must be a positive integer".into()));
        }
        if !(self.initial_height > 0.0 && self.initial_height.is_finite()) {
            return Err(Error::invalid_height("initial layer height", self.initial_height));
        }
        if !self.delta_per_block.is_finite() {
            return Err(Error::InvalidRule(format!(
                "per-block height change must be a finite number, got {}",
                self.delta_per_block
            )));
        }
        Ok(())
    }
}

impl LayerHeightRule {
    pub fn validate(&self) -> Result<()> {
        match self {
            LayerHeightRule::Rescale { new_height } => check_height("new layer height", *new_height),
            LayerHeightRule::BlockGrowth(growth) => growth.validate(),
        }
    }
}

fn check_height(what: &str, value: Mm) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(Error::invalid_height(what, value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerTarget {
    pub layer: LayerNumber,
    pub block: LayerNumber,
    pub height: Mm,
    pub clamped: bool,
    // Z at the end of this layer.
    pub z: Mm,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TargetZTable {
    // entries[i] is layer i + 1
    entries: Vec<LayerTarget>,
}

impl TargetZTable {
    pub fn build(total_layers: LayerNumber, growth: &BlockGrowth) -> TargetZTable {
        let mut entries = Vec::with_capacity(total_layers.min(MAX_LAYERS) as usize);
        let mut z: Mm = 0.0;
        for layer in 1..=total_layers {
            let block = growth.block_of(layer);
            let height = growth.height(block);
            z += height;
            entries.push(LayerTarget {
                layer,
                block,
                height,
                clamped: growth.raw_height(block) <= 0.0,
                z,
            });
        }
        TargetZTable { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LayerTarget] {
        &self.entries
    }

    pub fn z_values(&self) -> impl Iterator<Item = Mm> + '_ {
        self.entries.iter().map(|e| e.z)
    }

    pub fn target(&self, layer: LayerNumber) -> Option<Mm> {
        let index = (layer as usize).checked_sub(1)?;
        self.entries.get(index).map(|e| e.z)
    }

    fn render(&self) -> String {
        let mut s = String::new();
        writeln!(s, "| Layer # | Block Idx | Individual LH | Cumulative Z |").ok();
        writeln!(s, "|---------|-----------|---------------|--------------|").ok();
        for e in &self.entries {
            writeln!(s, "| {:<7} | {:<9} | {:<13.3} | {:<12.3} |", e.layer, e.block, e.height, e.z).ok();
        }
        s
    }
}

/// What the rewriter replaces a `Z` token with, per layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ZPlan {
    Table(TargetZTable),
    Rescale { new_height: Mm, original_height: Mm },
}

impl ZPlan {
    /// New value for a `Z` word currently at `original_z` on `layer`. The caller checks that
    /// `layer` is within `1..=total_layers`.
    pub fn target(&self, layer: LayerNumber, original_z: Mm) -> Option<Mm> {
        match self {
            ZPlan::Table(table) => table.target(layer),
            ZPlan::Rescale { new_height, original_height } => {
                if original_z == 0.0 {
                    return Some(0.0);
                }
                Some(new_height * (original_z / original_height))
            }
        }
    }
}

/// Builds the plan for a file with `total_layers` layers.
///
/// `original_height` is only consulted for [`LayerHeightRule::Rescale`], where it's required.
pub fn plan(total_layers: LayerNumber, rule: &LayerHeightRule, original_height: Option<Mm>) -> Result<ZPlan> {
    if total_layers == 0 {
        return Err(Error::NoLayers);
    }
    rule.validate()?;

    match rule {
        LayerHeightRule::Rescale { new_height } => {
            let original_height = original_height.ok_or(Error::OriginalHeightUnknown)?;
            check_height("original layer height", original_height)?;
            log::info!("rescaling Z from layer height {:.3}mm to {:.3}mm", original_height, new_height);
            Ok(ZPlan::Rescale { new_height: *new_height, original_height })
        }
        LayerHeightRule::BlockGrowth(growth) => {
            if total_layers > MAX_LAYERS {
                return Err(Error::TooManyLayers(total_layers));
            }
            if let Some(block) = growth.projected_zero_block(total_layers) {
                log::warn!(
                    "with these parameters the layer height reaches zero or below at block {}; those layers use {:.3}mm",
                    block,
                    MIN_LAYER_HEIGHT
                );
            }
            let table = TargetZTable::build(total_layers, growth);
            let mut last_clamped_block = None;
            for e in table.entries().iter().filter(|e| e.clamped) {
                if last_clamped_block != Some(e.block) {
                    log::warn!(
                        "computed layer height for block {} (from layer {}) is {:.3}mm (<= 0), using {:.3}mm",
                        e.block + 1,
                        e.layer,
                        growth.raw_height(e.block),
                        MIN_LAYER_HEIGHT
                    );
                    last_clamped_block = Some(e.block);
                }
            }
            log::debug!("planned per-layer heights and cumulative Z:\n{}", table.render());
            Ok(ZPlan::Table(table))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn growth(layers_per_block: LayerNumber, initial_height: Mm, delta_per_block: Mm) -> BlockGrowth {
        BlockGrowth { layers_per_block, initial_height, delta_per_block }
    }

    #[test]
    fn growing_heights_accumulate() {
        let table = TargetZTable::build(3, &growth(1, 0.3, 0.1));
        let z: Vec<Mm> = table.z_values().collect();
        assert_eq!(z.len(), 3);
        assert_relative_eq!(z[0], 0.3, epsilon = 1e-9);
        assert_relative_eq!(z[1], 0.7, epsilon = 1e-9);
        assert_relative_eq!(z[2], 1.2, epsilon = 1e-9);
        assert_eq!(format!("{:.3}", z[2]), "1.200");
    }

    #[test]
    fn zero_delta_is_uniform() {
        let g = growth(4, 0.25, 0.0);
        let table = TargetZTable::build(37, &g);
        for (k, z) in table.z_values().enumerate() {
            assert_relative_eq!(z, 0.25 * (k + 1) as Mm, epsilon = 1e-9);
        }
    }

    #[test]
    fn blocks_share_a_height() {
        let g = growth(3, 0.2, 0.05);
        let table = TargetZTable::build(7, &g);
        let heights: Vec<Mm> = table.entries().iter().map(|e| e.height).collect();
        let blocks: Vec<LayerNumber> = table.entries().iter().map(|e| e.block).collect();
        assert_eq!(blocks, vec![0, 0, 0, 1, 1, 1, 2]);
        assert_relative_eq!(heights[0], 0.2);
        assert_relative_eq!(heights[2], 0.2);
        assert_relative_eq!(heights[3], 0.25);
        assert_relative_eq!(heights[6], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn negative_delta_clamps_and_plateaus() {
        let g = growth(2, 0.3, -0.1);
        let table = TargetZTable::build(10, &g);
        let mut prev = 0.0;
        for e in table.entries() {
            let step = e.z - prev;
            assert!(step > 0.0, "layer {} went backwards", e.layer);
            assert_relative_eq!(step, g.height(e.block), epsilon = 1e-9);
            prev = e.z;
        }
        // blocks 0..=2 are 0.3, 0.2, 0.1; block 3 onwards would be <= 0
        let last = table.entries().last().unwrap();
        assert!(last.clamped);
        assert_relative_eq!(last.height, MIN_LAYER_HEIGHT);
        assert!(!table.entries()[0].clamped);
        assert_eq!(g.projected_zero_block(10), Some(3));
        assert_eq!(g.projected_zero_block(4), None);
    }

    #[test]
    fn positive_delta_never_projects_zero() {
        assert_eq!(growth(1, 0.2, 0.01).projected_zero_block(1000), None);
    }

    #[test]
    fn table_lookup_is_one_indexed() {
        let table = TargetZTable::build(2, &growth(1, 0.5, 0.0));
        assert_eq!(table.target(0), None);
        assert_relative_eq!(table.target(1).unwrap(), 0.5);
        assert_relative_eq!(table.target(2).unwrap(), 1.0);
        assert_eq!(table.target(3), None);
    }

    #[test]
    fn rescale_is_proportional() {
        let p = plan(5, &LayerHeightRule::Rescale { new_height: 0.2 }, Some(0.5)).unwrap();
        assert_relative_eq!(p.target(1, 0.5).unwrap(), 0.2);
        assert_relative_eq!(p.target(3, 1.5).unwrap(), 0.6, epsilon = 1e-12);
        assert_eq!(p.target(1, 0.0), Some(0.0));
    }

    #[test]
    fn rescale_needs_an_original_height() {
        let rule = LayerHeightRule::Rescale { new_height: 0.2 };
        assert!(matches!(plan(5, &rule, None), Err(Error::OriginalHeightUnknown)));
        assert!(matches!(plan(5, &rule, Some(0.0)), Err(Error::InvalidRule(_))));
    }

    #[test]
    fn no_layers_is_fatal() {
        let rule = LayerHeightRule::BlockGrowth(growth(1, 0.3, 0.0));
        assert!(matches!(plan(0, &rule, None), Err(Error::NoLayers)));
    }

    #[test]
    fn absurd_layer_count_is_rejected() {
        let rule = LayerHeightRule::BlockGrowth(growth(1, 0.2, 0.0));
        assert!(matches!(plan(4_000_000_000, &rule, None), Err(Error::TooManyLayers(4_000_000_000))));
        assert!(plan(MAX_LAYERS, &LayerHeightRule::BlockGrowth(growth(100, 0.2, 0.0)), None).is_ok());
    }

    #[test]
    fn rejects_bad_rules() {
        let bad = [
            LayerHeightRule::BlockGrowth(growth(0, 0.3, 0.0)),
            LayerHeightRule::BlockGrowth(growth(1, 0.0, 0.0)),
            LayerHeightRule::BlockGrowth(growth(1, -0.2, 0.1)),
            LayerHeightRule::BlockGrowth(growth(1, 0.2, Mm::NAN)),
            LayerHeightRule::Rescale { new_height: 0.0 },
            LayerHeightRule::Rescale { new_height: Mm::INFINITY },
        ];
        for rule in bad {
            assert!(matches!(plan(3, &rule, Some(0.2)), Err(Error::InvalidRule(_))), "{:?}", rule);
        }
    }
}
