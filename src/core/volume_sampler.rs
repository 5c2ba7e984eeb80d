use crate::core::geometry::VolumeDescriptor;
use crate::types::{ExtractError, ExtractResult, FastAxis, TraceBlock, WellTable};
use ndarray::Array3;
use num_traits::Float;

/// Rebuild the `[inline, crossline, depth]` cube from traces in acquisition order
///
/// Inline-fast data is stored crossline-major, so it is reshaped as
/// `(crossline, inline, depth)` and the first two axes are swapped.
pub fn reconstruct_volume<T: Copy>(
    descriptor: &VolumeDescriptor,
    data: Vec<T>,
    samples_per_trace: usize,
) -> ExtractResult<Array3<T>> {
    let ni = descriptor.inline_axis.len();
    let nx = descriptor.crossline_axis.len();
    let ns = samples_per_trace;

    if ns != descriptor.depth_axis.count {
        return Err(ExtractError::VolumeShape(format!(
            "traces have {} samples but the depth axis has {}",
            ns, descriptor.depth_axis.count
        )));
    }
    let expected = ni * nx * ns;
    if data.len() != expected {
        return Err(ExtractError::VolumeShape(format!(
            "{} samples cannot be reshaped to {} inlines x {} crosslines x {} samples",
            data.len(),
            ni,
            nx,
            ns
        )));
    }

    let shape_error = |e: ndarray::ShapeError| ExtractError::VolumeShape(format!("failed to reshape traces: {}", e));
    let volume = match descriptor.fast_axis {
        FastAxis::Crossline => Array3::from_shape_vec((ni, nx, ns), data).map_err(shape_error)?,
        FastAxis::Inline => Array3::from_shape_vec((nx, ni, ns), data)
            .map_err(shape_error)?
            .permuted_axes([1, 0, 2]),
    };
    Ok(volume)
}

/// Trilinear sampler over a reconstructed volume
pub struct VolumeSampler<'a, T> {
    volume: &'a Array3<T>,
    inline_axis: &'a [f64],
    crossline_axis: &'a [f64],
    depth_axis: Vec<f64>,
}

impl<'a, T: Float> VolumeSampler<'a, T> {
    pub fn new(volume: &'a Array3<T>, descriptor: &'a VolumeDescriptor) -> ExtractResult<Self> {
        let depth_axis = descriptor.depth_axis.values();
        let expected = (descriptor.inline_axis.len(), descriptor.crossline_axis.len(), depth_axis.len());
        if volume.dim() != expected {
            return Err(ExtractError::VolumeShape(format!(
                "volume shape {:?} does not match axes {:?}",
                volume.dim(),
                expected
            )));
        }
        Ok(Self {
            volume,
            inline_axis: &descriptor.inline_axis,
            crossline_axis: &descriptor.crossline_axis,
            depth_axis,
        })
    }

    /// Interpolated value at one (inline, crossline, depth) point
    pub fn sample_point(&self, inline: f64, crossline: f64, depth: f64) -> ExtractResult<f64> {
        let (i, ti) = locate(self.inline_axis, inline, "inline")?;
        let (j, tj) = locate(self.crossline_axis, crossline, "crossline")?;
        let (k, tk) = locate(&self.depth_axis, depth, "depth")?;

        let mut value = 0.0;
        for (di, wi) in [(0, 1.0 - ti), (1, ti)] {
            if wi == 0.0 {
                continue;
            }
            for (dj, wj) in [(0, 1.0 - tj), (1, tj)] {
                if wj == 0.0 {
                    continue;
                }
                for (dk, wk) in [(0, 1.0 - tk), (1, tk)] {
                    if wk == 0.0 {
                        continue;
                    }
                    let node = self.volume[[i + di, j + dj, k + dk]].to_f64().unwrap_or(f64::NAN);
                    value += wi * wj * wk * node;
                }
            }
        }
        Ok(value)
    }

    /// Values at every query point, same order as the input
    pub fn sample(&self, points: &[[f64; 3]]) -> ExtractResult<Vec<f64>> {
        points.iter().map(|p| self.sample_point(p[0], p[1], p[2])).collect()
    }

    /// Values at every mapped row of a well table
    pub fn sample_table(&self, table: &WellTable) -> ExtractResult<Vec<f64>> {
        table
            .rows
            .iter()
            .map(|row| {
                let grid = row.grid()?;
                self.sample_point(grid.inline, grid.crossline, row.depth)
            })
            .collect()
    }
}

/// Lower node index and fractional offset of `value` on a sorted axis
fn locate(axis: &[f64], value: f64, name: &'static str) -> ExtractResult<(usize, f64)> {
    let n = axis.len();
    let out_of_bounds = || ExtractError::QueryOutOfBounds { axis: name, value };
    if n == 0 || !value.is_finite() || value < axis[0] || value > axis[n - 1] {
        return Err(out_of_bounds());
    }
    if n == 1 {
        return Ok((0, 0.0));
    }
    let i = axis.partition_point(|&a| a <= value).saturating_sub(1).min(n - 2);
    let t = (value - axis[i]) / (axis[i + 1] - axis[i]);
    Ok((i, t))
}

/// Load traces into a cube, sample the table, release the cube
pub fn extract_column(descriptor: &VolumeDescriptor, traces: TraceBlock, table: &WellTable) -> ExtractResult<Vec<f64>> {
    let volume = reconstruct_volume(descriptor, traces.data, traces.samples_per_trace)?;
    let sampler = VolumeSampler::new(&volume, descriptor)?;
    sampler.sample_table(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_nodes_and_bounds() {
        let axis = [10.0, 20.0, 30.0];
        assert_eq!(locate(&axis, 10.0, "a").unwrap(), (0, 0.0));
        assert_eq!(locate(&axis, 20.0, "a").unwrap(), (1, 0.0));
        assert_eq!(locate(&axis, 30.0, "a").unwrap(), (1, 1.0));
        assert_eq!(locate(&axis, 25.0, "a").unwrap(), (1, 0.5));
        assert!(locate(&axis, 30.5, "a").is_err());
        assert!(locate(&axis, f64::NAN, "a").is_err());
        assert_eq!(locate(&[1.0], 1.0, "a").unwrap(), (0, 0.0));
        assert!(locate(&[1.0], 1.5, "a").is_err());
    }
}
