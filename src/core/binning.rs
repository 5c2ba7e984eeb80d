use crate::core::geometry::VolumeDescriptor;
use crate::types::{ExtractError, ExtractResult, GridPosition, WellSample, WellTable};
use std::collections::BTreeMap;

/// Separator used when samples of several wells merge into one bin
pub const MERGED_WELL_SEPARATOR: &str = "+";

/// Bin steps of a volume along inline, crossline and depth
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinGrid {
    pub inline_step: f64,
    pub crossline_step: f64,
    pub depth_step: f64,
}

impl BinGrid {
    pub fn from_descriptor(descriptor: &VolumeDescriptor) -> ExtractResult<Self> {
        let grid = Self {
            inline_step: estimate_step(&descriptor.inline_axis),
            crossline_step: estimate_step(&descriptor.crossline_axis),
            depth_step: descriptor.depth_axis.step,
        };
        for (name, step) in [
            ("inline", grid.inline_step),
            ("crossline", grid.crossline_step),
            ("depth", grid.depth_step),
        ] {
            if !(step.is_finite() && step > 0.0) {
                return Err(ExtractError::VolumeShape(format!("invalid {} bin step {}", name, step)));
            }
        }
        log::debug!("Bin grid: {:?}", grid);
        Ok(grid)
    }

    /// Integer bin indices of a mapped sample
    fn key(&self, grid: GridPosition, depth: f64) -> ExtractResult<(i64, i64, i64)> {
        let index = |value: f64, step: f64, what: &str| {
            let k = (value / step).round();
            if k.is_finite() {
                Ok(k as i64)
            } else {
                Err(ExtractError::Schema(format!("cannot bin non-finite {} value {}", what, value)))
            }
        };
        Ok((
            index(grid.inline, self.inline_step, "inline")?,
            index(grid.crossline, self.crossline_step, "crossline")?,
            index(depth, self.depth_step, "depth")?,
        ))
    }
}

/// Rounded mean spacing of a sorted unique axis
fn estimate_step(axis: &[f64]) -> f64 {
    if axis.len() < 2 {
        return 1.0;
    }
    let mean = (axis[axis.len() - 1] - axis[0]) / (axis.len() - 1) as f64;
    let rounded = mean.round();
    if rounded == 0.0 { mean } else { rounded }
}

/// Snaps mapped samples to the bin/depth grid and averages duplicates
pub struct BinAligner {
    grid: BinGrid,
}

impl BinAligner {
    pub fn new(grid: BinGrid) -> Self {
        Self { grid }
    }

    pub fn grid(&self) -> BinGrid {
        self.grid
    }

    /// Round every row to its bin and replace each bin group with its mean
    ///
    /// Bins are multiples of the step counted from zero, not from the first
    /// axis value. On an axis whose values are not multiples of its step a
    /// row can snap past the last node and is then removed by the crop: with
    /// inlines 101..=119 and step 2, inline 119 snaps to 120.
    pub fn align(&self, table: &mut WellTable) -> ExtractResult<()> {
        let before = table.len();
        let mut groups: BTreeMap<(i64, i64, i64), BinAccumulator> = BTreeMap::new();

        for row in table.rows.drain(..) {
            let key = self.grid.key(row.grid()?, row.depth)?;
            groups.entry(key).or_insert_with(|| BinAccumulator::new(row.attributes.len())).add(row);
        }

        table.rows = groups
            .into_iter()
            .map(|((il, xl, z), acc)| {
                acc.finish(
                    il as f64 * self.grid.inline_step,
                    xl as f64 * self.grid.crossline_step,
                    z as f64 * self.grid.depth_step,
                )
            })
            .collect();

        log::debug!("Bin averaging: {} samples -> {} bins", before, table.len());
        Ok(())
    }
}

/// Running NaN-skipping mean of one numeric field
#[derive(Debug, Clone, Copy, Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn add(&mut self, value: f64) {
        if !value.is_nan() {
            self.sum += value;
            self.count += 1;
        }
    }

    fn value(&self) -> f64 {
        if self.count == 0 { f64::NAN } else { self.sum / self.count as f64 }
    }
}

struct BinAccumulator {
    wells: Vec<String>,
    x: Mean,
    y: Mean,
    attributes: Vec<Mean>,
}

impl BinAccumulator {
    fn new(attribute_count: usize) -> Self {
        Self {
            wells: Vec::new(),
            x: Mean::default(),
            y: Mean::default(),
            attributes: vec![Mean::default(); attribute_count],
        }
    }

    fn add(&mut self, row: WellSample) {
        if let Some(well) = row.well {
            if !self.wells.contains(&well) {
                self.wells.push(well);
            }
        }
        self.x.add(row.x);
        self.y.add(row.y);
        if self.attributes.len() < row.attributes.len() {
            self.attributes.resize(row.attributes.len(), Mean::default());
        }
        for (mean, value) in self.attributes.iter_mut().zip(row.attributes) {
            mean.add(value);
        }
    }

    /// Inline, crossline and depth of a bin are its snapped values
    fn finish(self, inline: f64, crossline: f64, depth: f64) -> WellSample {
        let well = if self.wells.is_empty() { None } else { Some(self.wells.join(MERGED_WELL_SEPARATOR)) };
        WellSample {
            well,
            x: self.x.value(),
            y: self.y.value(),
            depth,
            grid: Some(GridPosition { inline, crossline }),
            attributes: self.attributes.iter().map(Mean::value).collect(),
        }
    }
}

/// Replicates aligned samples into the bins within a radius
pub struct NeighborhoodExpander {
    radius_bins: usize,
}

impl NeighborhoodExpander {
    pub fn new(radius_bins: usize) -> Self {
        Self { radius_bins }
    }

    /// Convert a radius in physical units to whole bins
    pub fn from_physical_radius(radius: f64, bin_size: f64) -> ExtractResult<Self> {
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(ExtractError::Schema(format!("invalid expansion radius {}", radius)));
        }
        if radius == 0.0 {
            return Ok(Self::new(0));
        }
        if !(bin_size.is_finite() && bin_size > 0.0) {
            return Err(ExtractError::Schema(format!(
                "cannot convert radius {} to bins: bin size is {}",
                radius, bin_size
            )));
        }
        Ok(Self::new((radius / bin_size).round() as usize))
    }

    pub fn radius_bins(&self) -> usize {
        self.radius_bins
    }

    /// Bin offsets within the radius, distance measured in bin indices
    pub fn offsets(&self) -> Vec<(i64, i64)> {
        let r = self.radius_bins as i64;
        let r2 = r * r;
        let mut offsets = Vec::new();
        for di in -r..=r {
            for dj in -r..=r {
                if di * di + dj * dj <= r2 {
                    offsets.push((di, dj));
                }
            }
        }
        offsets
    }

    /// Expand every row into its neighbourhood, then merge overlaps
    pub fn expand(&self, table: &mut WellTable, aligner: &BinAligner) -> ExtractResult<()> {
        if self.radius_bins == 0 {
            return Ok(());
        }
        let grid = aligner.grid();
        let offsets = self.offsets();
        let before = table.len();

        let mut expanded = Vec::with_capacity(table.len() * offsets.len());
        for row in &table.rows {
            let origin = row.grid()?;
            for &(di, dj) in &offsets {
                let mut neighbour = row.clone();
                neighbour.grid = Some(GridPosition {
                    inline: origin.inline + di as f64 * grid.inline_step,
                    crossline: origin.crossline + dj as f64 * grid.crossline_step,
                });
                expanded.push(neighbour);
            }
        }
        table.rows = expanded;
        aligner.align(table)?;

        log::debug!(
            "Neighbourhood expansion (radius {} bins): {} samples -> {}",
            self.radius_bins,
            before,
            table.len()
        );
        Ok(())
    }
}

/// Drops samples outside the volume extent
pub struct Cropper {
    inline: (f64, f64),
    crossline: (f64, f64),
    depth: (f64, f64),
}

impl Cropper {
    pub fn new(descriptor: &VolumeDescriptor) -> Self {
        Self {
            inline: descriptor.inline_range(),
            crossline: descriptor.crossline_range(),
            depth: (descriptor.depth_axis.min(), descriptor.depth_axis.max()),
        }
    }

    pub fn contains(&self, grid: GridPosition, depth: f64) -> bool {
        let within = |v: f64, (lo, hi): (f64, f64)| v >= lo && v <= hi;
        within(grid.inline, self.inline) && within(grid.crossline, self.crossline) && within(depth, self.depth)
    }

    pub fn crop(&self, table: &mut WellTable) -> ExtractResult<()> {
        let before = table.len();
        let mut kept = Vec::with_capacity(table.len());
        for row in table.rows.drain(..) {
            if self.contains(row.grid()?, row.depth) {
                kept.push(row);
            }
        }
        table.rows = kept;
        log::debug!("Cropping to volume extent: {} samples -> {}", before, table.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapped(well: &str, inline: f64, crossline: f64, depth: f64, attr: f64) -> WellSample {
        let mut s = WellSample::new(Some(well), 0.0, 0.0, depth).with_attributes(vec![attr]);
        s.grid = Some(GridPosition { inline, crossline });
        s
    }

    fn grid() -> BinGrid {
        BinGrid { inline_step: 1.0, crossline_step: 2.0, depth_step: 4.0 }
    }

    #[test]
    fn test_estimate_step() {
        assert_eq!(estimate_step(&[100.0]), 1.0);
        assert_eq!(estimate_step(&[100.0, 102.0, 104.0]), 2.0);
        assert!((estimate_step(&[0.0, 0.25, 0.5]) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_align_rounds_to_steps_and_averages() {
        let mut table = WellTable::from_samples(vec![
            mapped("A", 10.2, 21.2, 7.0, 1.0),
            mapped("A", 9.8, 22.6, 9.0, 3.0),
            mapped("B", 15.0, 30.0, 100.0, 5.0),
        ]);
        BinAligner::new(grid()).align(&mut table).unwrap();
        assert_eq!(table.len(), 2);
        let first = &table.rows[0];
        assert_eq!(first.grid, Some(GridPosition { inline: 10.0, crossline: 22.0 }));
        assert_eq!(first.depth, 8.0);
        assert_eq!(first.attributes, vec![2.0]);
        assert_eq!(first.well.as_deref(), Some("A"));
    }

    #[test]
    fn test_align_merges_well_names_and_skips_nan() {
        let mut table = WellTable::from_samples(vec![
            mapped("A", 1.0, 2.0, 4.0, f64::NAN),
            mapped("B", 1.0, 2.0, 4.0, 6.0),
        ]);
        BinAligner::new(grid()).align(&mut table).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].well.as_deref(), Some("A+B"));
        assert_eq!(table.rows[0].attributes, vec![6.0]);
    }

    #[test]
    fn test_offsets_within_radius() {
        let expander = NeighborhoodExpander::new(1);
        let offsets = expander.offsets();
        assert_eq!(offsets.len(), 5);
        assert!(!offsets.contains(&(1, 1)));
        assert_eq!(NeighborhoodExpander::new(0).offsets(), vec![(0, 0)]);
    }

    #[test]
    fn test_physical_radius_conversion() {
        assert_eq!(NeighborhoodExpander::from_physical_radius(60.0, 25.0).unwrap().radius_bins(), 2);
        assert_eq!(NeighborhoodExpander::from_physical_radius(0.0, 0.0).unwrap().radius_bins(), 0);
        assert!(NeighborhoodExpander::from_physical_radius(10.0, 0.0).is_err());
        assert!(NeighborhoodExpander::from_physical_radius(-1.0, 25.0).is_err());
    }

    #[test]
    fn test_unmapped_rows_are_rejected() {
        let mut table = WellTable::from_samples(vec![WellSample::new(Some("A"), 1.0, 2.0, 3.0)]);
        let result = BinAligner::new(grid()).align(&mut table);
        assert!(matches!(result, Err(ExtractError::Schema(_))));
    }
}
