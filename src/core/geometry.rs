use crate::types::{
    DepthAxis, ExtractError, ExtractResult, FastAxis, GeoPoint, GridPoint, SurveyKind,
};

/// Largest trace position difference, in map units, between volumes of one survey
pub const POSITION_TOLERANCE: f64 = 1e-3;

/// Geometry read from the trace headers of one volume
#[derive(Debug, Clone, PartialEq)]
pub struct TraceHeaderSummary {
    /// Geographic coordinates, one per trace in acquisition order
    pub geo_coords: Vec<GeoPoint>,
    /// Grid coordinates, same order and length as `geo_coords`
    pub grid_coords: Vec<GridPoint>,
    pub depth_axis: DepthAxis,
}

/// Geometry of a seismic volume
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeDescriptor {
    pub kind: SurveyKind,
    pub geo_coords: Vec<GeoPoint>,
    pub grid_coords: Vec<GridPoint>,
    /// Sorted unique inline values
    pub inline_axis: Vec<f64>,
    /// Sorted unique crossline values
    pub crossline_axis: Vec<f64>,
    pub depth_axis: DepthAxis,
    pub fast_axis: FastAxis,
    /// Distance between the first two traces, used to express physical radii in bins
    pub bin_size: f64,
}

impl VolumeDescriptor {
    /// Build a descriptor from scanned headers
    pub fn from_headers(kind: SurveyKind, headers: TraceHeaderSummary) -> ExtractResult<Self> {
        let TraceHeaderSummary { geo_coords, grid_coords, depth_axis } = headers;

        if geo_coords.is_empty() {
            return Err(ExtractError::VolumeShape("volume has no traces".to_string()));
        }
        if geo_coords.len() != grid_coords.len() {
            return Err(ExtractError::VolumeShape(format!(
                "{} geographic coordinates but {} grid coordinates",
                geo_coords.len(),
                grid_coords.len()
            )));
        }
        if depth_axis.count == 0 {
            return Err(ExtractError::VolumeShape("traces have no samples".to_string()));
        }
        if !(depth_axis.step.is_finite() && depth_axis.step > 0.0) {
            return Err(ExtractError::VolumeShape(format!(
                "invalid depth sampling interval {}",
                depth_axis.step
            )));
        }

        let inline_axis = unique_sorted(grid_coords.iter().map(|g| g[0]))?;
        let crossline_axis = unique_sorted(grid_coords.iter().map(|g| g[1]))?;

        let expected = inline_axis.len() * crossline_axis.len();
        if expected != grid_coords.len() {
            return Err(ExtractError::VolumeShape(format!(
                "{} traces cannot fill a regular grid of {} inlines x {} crosslines ({} bins)",
                grid_coords.len(),
                inline_axis.len(),
                crossline_axis.len(),
                expected
            )));
        }

        let fast_axis = detect_fast_axis(&grid_coords);
        check_trace_order(&grid_coords, &inline_axis, &crossline_axis, fast_axis)?;
        let bin_size = match (geo_coords.first(), geo_coords.get(1)) {
            (Some(a), Some(b)) => ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt(),
            _ => 0.0,
        };

        Ok(Self {
            kind,
            geo_coords,
            grid_coords,
            inline_axis,
            crossline_axis,
            depth_axis,
            fast_axis,
            bin_size,
        })
    }

    pub fn trace_count(&self) -> usize {
        self.grid_coords.len()
    }

    pub fn inline_range(&self) -> (f64, f64) {
        axis_range(&self.inline_axis)
    }

    pub fn crossline_range(&self) -> (f64, f64) {
        axis_range(&self.crossline_axis)
    }

    /// Replace the first depth value, keeping step and sample count
    pub fn with_start_depth(&self, start: f64) -> Self {
        let mut descriptor = self.clone();
        descriptor.depth_axis.start = start;
        descriptor
    }

    /// Check that another volume shares this geometry
    ///
    /// The depth start is not compared since it may be overridden by the user.
    pub fn ensure_same_geometry(&self, other: &VolumeDescriptor, volume: &str) -> ExtractResult<()> {
        let mismatch = |what: &str| {
            Err(ExtractError::VolumeShape(format!(
                "volume '{}' does not share the reference geometry: {} differs",
                volume, what
            )))
        };

        if self.trace_count() != other.trace_count() {
            return mismatch("trace count");
        }
        if self.inline_axis != other.inline_axis {
            return mismatch("inline axis");
        }
        if self.crossline_axis != other.crossline_axis {
            return mismatch("crossline axis");
        }
        if self.fast_axis != other.fast_axis {
            return mismatch("fast axis");
        }
        if !self.depth_axis.same_sampling(&other.depth_axis) {
            return mismatch("depth sampling");
        }
        if (self.bin_size - other.bin_size).abs() > POSITION_TOLERANCE {
            return mismatch("bin size");
        }
        let moved = self.geo_coords.iter().zip(&other.geo_coords).position(|(a, b)| {
            (a[0] - b[0]).abs() > POSITION_TOLERANCE || (a[1] - b[1]).abs() > POSITION_TOLERANCE
        });
        if let Some(t) = moved {
            return mismatch(format!("position of trace {}", t).as_str());
        }
        Ok(())
    }
}

/// Check that every trace lies on the node the reshape assigns to it
///
/// Traces must follow ascending inline and crossline numbering with the fast
/// axis varying first.
fn check_trace_order(
    grid_coords: &[GridPoint],
    inline_axis: &[f64],
    crossline_axis: &[f64],
    fast_axis: FastAxis,
) -> ExtractResult<()> {
    let ni = inline_axis.len();
    let nx = crossline_axis.len();
    for (t, g) in grid_coords.iter().enumerate() {
        let (i, j) = match fast_axis {
            FastAxis::Crossline => (t / nx, t % nx),
            FastAxis::Inline => (t % ni, t / ni),
        };
        let expected = [inline_axis[i], crossline_axis[j]];
        if *g != expected {
            return Err(ExtractError::VolumeShape(format!(
                "trace {} is at inline {} crossline {}, but {} fast ascending order puts inline {} crossline {} there",
                t, g[0], g[1], fast_axis, expected[0], expected[1]
            )));
        }
    }
    Ok(())
}

/// Detect the fast axis from the first traces
///
/// Traces 0 and 2 are compared; trace 1 may sit on a bin boundary.
pub fn detect_fast_axis(grid_coords: &[GridPoint]) -> FastAxis {
    if grid_coords.len() < 2 {
        return FastAxis::Crossline;
    }
    let probe = 2.min(grid_coords.len() - 1);
    if grid_coords[0][0] == grid_coords[probe][0] {
        FastAxis::Crossline
    } else {
        FastAxis::Inline
    }
}

fn unique_sorted(values: impl Iterator<Item = f64>) -> ExtractResult<Vec<f64>> {
    let mut axis: Vec<f64> = values.collect();
    if let Some(bad) = axis.iter().find(|v| !v.is_finite()) {
        return Err(ExtractError::VolumeShape(format!("non-finite grid coordinate {}", bad)));
    }
    axis.sort_by(|a, b| a.total_cmp(b));
    axis.dedup();
    Ok(axis)
}

fn axis_range(axis: &[f64]) -> (f64, f64) {
    match (axis.first(), axis.last()) {
        (Some(&lo), Some(&hi)) => (lo, hi),
        _ => (f64::NAN, f64::NAN),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_headers(inlines: &[f64], crosslines: &[f64], fast: FastAxis) -> TraceHeaderSummary {
        let mut grid = Vec::new();
        match fast {
            FastAxis::Crossline => {
                for &il in inlines {
                    for &xl in crosslines {
                        grid.push([il, xl]);
                    }
                }
            }
            FastAxis::Inline => {
                for &xl in crosslines {
                    for &il in inlines {
                        grid.push([il, xl]);
                    }
                }
            }
        }
        let geo = grid.iter().map(|g| [g[0] * 25.0, g[1] * 12.5]).collect();
        TraceHeaderSummary { geo_coords: geo, grid_coords: grid, depth_axis: DepthAxis::new(0.0, 4.0, 10) }
    }

    #[test]
    fn test_fast_axis_detection_recovers_known_axis() {
        for ni in 3..6 {
            for nx in 3..6 {
                let inlines: Vec<f64> = (0..ni).map(|i| 100.0 + i as f64).collect();
                let crosslines: Vec<f64> = (0..nx).map(|i| 200.0 + 2.0 * i as f64).collect();
                for fast in [FastAxis::Inline, FastAxis::Crossline] {
                    let headers = grid_headers(&inlines, &crosslines, fast);
                    assert_eq!(detect_fast_axis(&headers.grid_coords), fast);
                }
            }
        }
    }

    #[test]
    fn test_descriptor_axes_and_bin_size() {
        let headers = grid_headers(&[10.0, 11.0, 12.0], &[5.0, 6.0, 7.0, 8.0], FastAxis::Crossline);
        let d = VolumeDescriptor::from_headers(SurveyKind::Survey3D, headers).unwrap();
        assert_eq!(d.inline_axis, vec![10.0, 11.0, 12.0]);
        assert_eq!(d.crossline_axis, vec![5.0, 6.0, 7.0, 8.0]);
        assert_eq!(d.fast_axis, FastAxis::Crossline);
        assert!((d.bin_size - 12.5).abs() < 1e-12);
        assert_eq!(d.inline_range(), (10.0, 12.0));
    }

    #[test]
    fn test_descriptor_rejects_incomplete_grid() {
        let mut headers = grid_headers(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], FastAxis::Crossline);
        headers.grid_coords.pop();
        headers.geo_coords.pop();
        let result = VolumeDescriptor::from_headers(SurveyKind::Survey3D, headers);
        assert!(matches!(result, Err(ExtractError::VolumeShape(_))));
    }

    #[test]
    fn test_descriptor_rejects_duplicated_bin() {
        // (1, 1) twice and (1, 2) missing still gives 2 x 2 unique values
        let grid = vec![[1.0, 1.0], [1.0, 1.0], [2.0, 1.0], [2.0, 2.0]];
        let headers = TraceHeaderSummary {
            geo_coords: grid.iter().map(|g| [g[1] * 25.0, g[0] * 25.0]).collect(),
            grid_coords: grid,
            depth_axis: DepthAxis::new(0.0, 4.0, 3),
        };
        let result = VolumeDescriptor::from_headers(SurveyKind::Survey3D, headers);
        assert!(matches!(result, Err(ExtractError::VolumeShape(_))));
    }

    #[test]
    fn test_descriptor_rejects_descending_numbering() {
        let headers = grid_headers(&[3.0, 2.0, 1.0], &[1.0, 2.0, 3.0], FastAxis::Crossline);
        let result = VolumeDescriptor::from_headers(SurveyKind::Survey3D, headers);
        assert!(matches!(result, Err(ExtractError::VolumeShape(_))));

        let headers = grid_headers(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0], FastAxis::Inline);
        let result = VolumeDescriptor::from_headers(SurveyKind::Survey3D, headers);
        assert!(matches!(result, Err(ExtractError::VolumeShape(_))));
    }

    #[test]
    fn test_shifted_volume_is_a_mismatch() {
        let a = VolumeDescriptor::from_headers(
            SurveyKind::Survey3D,
            grid_headers(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], FastAxis::Crossline),
        )
        .unwrap();
        let mut shifted = grid_headers(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], FastAxis::Crossline);
        for p in &mut shifted.geo_coords {
            p[0] += 100.0;
        }
        let b = VolumeDescriptor::from_headers(SurveyKind::Survey3D, shifted).unwrap();
        let err = a.ensure_same_geometry(&b, "shifted").unwrap_err();
        assert!(err.to_string().contains("position of trace 0"), "{}", err);
    }

    #[test]
    fn test_geometry_mismatch_is_reported() {
        let a = VolumeDescriptor::from_headers(
            SurveyKind::Survey3D,
            grid_headers(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], FastAxis::Crossline),
        )
        .unwrap();
        let b = VolumeDescriptor::from_headers(
            SurveyKind::Survey3D,
            grid_headers(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], FastAxis::Inline),
        )
        .unwrap();
        assert!(a.ensure_same_geometry(&a.with_start_depth(100.0), "same").is_ok());
        assert!(matches!(a.ensure_same_geometry(&b, "other"), Err(ExtractError::VolumeShape(_))));
    }
}
