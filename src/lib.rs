//! SeisExtract: well-to-seismic attribute extraction
//!
//! Maps well samples given as geographic X/Y/depth onto the inline/crossline
//! grid of a seismic survey, fits them to the bin grid, and samples every
//! seismic volume of a folder at those positions with trilinear interpolation.
//! The result is a table with one attribute column per volume.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use crate::types::{
    DepthAxis, ExtractError, ExtractResult, FastAxis, GridPosition, ResultTable, SeismicVolume, SurveyKind,
    VolumeColumn, WellSample, WellTable,
};
pub use crate::config::{ColumnNames, ExtractionConfig};
pub use crate::core::{ExtractionPipeline, MappingOptions, PipelineState, VolumeDescriptor};
pub use crate::io::{ColumnSelection, HeaderByteLayout, InMemoryVolumes, SegyFolder, VolumeSource};

#[cfg(feature = "python")]
mod python {
    use crate::core::{ExtractionPipeline, MappingOptions};
    use crate::io::volume_source::DEFAULT_VOLUME_PATTERN;
    use crate::io::{ColumnSelection, HeaderByteLayout};
    use crate::types::{ExtractError, SurveyKind};
    use ndarray::Array2;
    use numpy::{IntoPyArray, PyArray2};
    use pyo3::prelude::*;

    fn to_py_err(err: ExtractError) -> PyErr {
        PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", err))
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_class::<PyExtractor>()?;
        Ok(())
    }

    /// Python wrapper for ExtractionPipeline
    #[pyclass(name = "Extractor")]
    struct PyExtractor {
        inner: ExtractionPipeline,
    }

    #[pymethods]
    impl PyExtractor {
        #[new]
        fn new() -> Self {
            PyExtractor { inner: ExtractionPipeline::new() }
        }

        #[pyo3(signature = (folder, line_2d = false, pattern = None))]
        fn scan_seismic_folder(&mut self, folder: String, line_2d: bool, pattern: Option<String>) -> PyResult<()> {
            let kind = if line_2d { SurveyKind::Line2D } else { SurveyKind::Survey3D };
            let pattern = pattern.unwrap_or_else(|| DEFAULT_VOLUME_PATTERN.to_string());
            self.inner
                .scan_seismic_folder(&folder, kind, HeaderByteLayout::default(), &pattern)
                .map_err(to_py_err)?;
            Ok(())
        }

        fn recalc_depth(&mut self, start_depth: f64) -> PyResult<()> {
            self.inner.override_start_depth(start_depth).map_err(to_py_err)
        }

        /// Columns by name when x, y and depth are given, else positional
        #[pyo3(signature = (path, x = None, y = None, depth = None, well = None, with_well = true))]
        fn load_table(
            &mut self,
            path: String,
            x: Option<String>,
            y: Option<String>,
            depth: Option<String>,
            well: Option<String>,
            with_well: bool,
        ) -> PyResult<()> {
            let selection = match (x, y, depth) {
                (Some(x), Some(y), Some(depth)) => ColumnSelection::ByName { well, x, y, depth },
                (None, None, None) => ColumnSelection::ByPosition { with_well },
                _ => {
                    return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(
                        "x, y and depth column names must be given together",
                    ))
                }
            };
            self.inner.load_table_file(&path, &selection).map_err(to_py_err)
        }

        fn restore_table(&mut self) -> PyResult<()> {
            self.inner.restore_table().map_err(to_py_err)
        }

        #[pyo3(signature = (bin_averaging = false, expansion_radius = 0.0))]
        fn calc_well_grid_coords(&mut self, bin_averaging: bool, expansion_radius: f64) -> PyResult<usize> {
            let options = MappingOptions { bin_averaging, expansion_radius };
            let table = self.inner.map_coordinates(&options).map_err(to_py_err)?;
            Ok(table.len())
        }

        #[pyo3(signature = (max_parallel = 1))]
        fn extract_all(&mut self, max_parallel: usize) -> PyResult<Vec<String>> {
            let result = self.inner.extract(max_parallel).map_err(to_py_err)?;
            Ok(result.volumes.iter().map(|c| c.name.clone()).collect())
        }

        #[pyo3(signature = (path, drop_columns = Vec::new()))]
        fn save_result_table(&self, path: String, drop_columns: Vec<String>) -> PyResult<()> {
            self.inner.save_result(&path, &drop_columns).map_err(to_py_err)
        }

        #[getter]
        fn state(&self) -> String {
            self.inner.state().to_string()
        }

        #[getter]
        fn inlines(&self) -> Vec<f64> {
            self.inner.descriptor().map(|d| d.inline_axis.clone()).unwrap_or_default()
        }

        #[getter]
        fn crosslines(&self) -> Vec<f64> {
            self.inner.descriptor().map(|d| d.crossline_axis.clone()).unwrap_or_default()
        }

        #[getter]
        fn depths(&self) -> Vec<f64> {
            self.inner.descriptor().map(|d| d.depth_axis.values()).unwrap_or_default()
        }

        #[getter]
        fn fast_axis(&self) -> Option<String> {
            self.inner.descriptor().map(|d| d.fast_axis.to_string())
        }

        #[getter]
        fn volumes(&self) -> Vec<String> {
            self.inner.volumes().iter().map(|v| v.name().to_string()).collect()
        }

        /// Mapped (inline, crossline, depth) of every well sample, NaN when unmapped
        #[getter]
        fn well_grid_coords<'py>(&self, py: Python<'py>) -> PyResult<&'py PyArray2<f64>> {
            let rows = self.inner.table().map(|t| t.rows.as_slice()).unwrap_or_default();
            let mut flat = Vec::with_capacity(rows.len() * 3);
            for row in rows {
                let (inline, crossline) = row.grid.map_or((f64::NAN, f64::NAN), |g| (g.inline, g.crossline));
                flat.extend_from_slice(&[inline, crossline, row.depth]);
            }
            let array = Array2::from_shape_vec((rows.len(), 3), flat)
                .map_err(|e| PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e)))?;
            Ok(array.into_pyarray(py))
        }

        fn __str__(&self) -> String {
            format!(
                "Extractor(state={}, volumes={}, samples={})",
                self.inner.state(),
                self.inner.volumes().len(),
                self.inner.table().map_or(0, |t| t.len())
            )
        }
    }
}
