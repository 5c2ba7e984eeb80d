use crate::config::ExtractionConfig;
use crate::core::binning::{BinAligner, BinGrid, Cropper, NeighborhoodExpander};
use crate::core::coordinate_mapping::{CoordinateMapper, CoordinateTransform, RegressionStrategy};
use crate::core::geometry::VolumeDescriptor;
use crate::core::volume_sampler::extract_column;
use crate::io::segy::HeaderByteLayout;
use crate::io::volume_source::{SegyFolder, VolumeId, VolumeSource};
use crate::io::well_table::{read_well_table, write_result_table, ColumnSelection};
use crate::types::{
    ExtractError, ExtractResult, GeoPoint, GridPosition, ResultTable, SurveyKind, VolumeColumn, WellTable,
};
use std::fmt;
use std::path::Path;
use std::time::Instant;

/// Progress of an extraction run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Empty,
    GeometryScanned,
    TableLoaded,
    CoordsMapped,
    Extracting,
    Done,
    Error,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Empty => "empty",
            PipelineState::GeometryScanned => "geometry-scanned",
            PipelineState::TableLoaded => "table-loaded",
            PipelineState::CoordsMapped => "coords-mapped",
            PipelineState::Extracting => "extracting",
            PipelineState::Done => "done",
            PipelineState::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// How mapped well samples are fitted to the bin grid
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MappingOptions {
    pub bin_averaging: bool,
    /// Neighbourhood radius in geographic units, used with bin averaging only
    pub expansion_radius: f64,
}

fn stage_error(stage: &'static str, err: ExtractError) -> ExtractError {
    ExtractError::Stage { stage, source: Box::new(err) }
}

/// Drives geometry scanning, well mapping and attribute extraction
///
/// Operations must be called in order; each one checks the current state and
/// reports `InvalidState` otherwise. A failed stage leaves the pipeline in
/// `PipelineState::Error`, from which `restore_table` recovers.
pub struct ExtractionPipeline {
    state: PipelineState,
    source: Option<Box<dyn VolumeSource>>,
    volumes: Vec<VolumeId>,
    descriptor: Option<VolumeDescriptor>,
    pristine: Option<WellTable>,
    table: Option<WellTable>,
    transform: Option<CoordinateTransform>,
    result: Option<ResultTable>,
}

impl Default for ExtractionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionPipeline {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Empty,
            source: None,
            volumes: Vec::new(),
            descriptor: None,
            pristine: None,
            table: None,
            transform: None,
            result: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn volumes(&self) -> &[VolumeId] {
        &self.volumes
    }

    pub fn descriptor(&self) -> Option<&VolumeDescriptor> {
        self.descriptor.as_ref()
    }

    /// Current well table (mapped once coordinates are computed)
    pub fn table(&self) -> Option<&WellTable> {
        self.table.as_ref()
    }

    pub fn transform(&self) -> Option<&CoordinateTransform> {
        self.transform.as_ref()
    }

    fn require(&self, stage: &'static str, operation: &'static str, allowed: &[PipelineState]) -> ExtractResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(stage_error(
                stage,
                ExtractError::InvalidState { operation, state: self.state.to_string() },
            ))
        }
    }

    fn fail(&mut self, stage: &'static str, err: ExtractError) -> ExtractError {
        log::error!("{} stage failed: {}", stage, err);
        self.state = PipelineState::Error;
        self.result = None;
        stage_error(stage, err)
    }

    /// List the source volumes and build the reference geometry from the first one
    pub fn scan_geometry(&mut self, source: Box<dyn VolumeSource>) -> ExtractResult<&VolumeDescriptor> {
        self.require("scan", "scan geometry", &[
            PipelineState::Empty,
            PipelineState::GeometryScanned,
            PipelineState::TableLoaded,
            PipelineState::CoordsMapped,
            PipelineState::Done,
            PipelineState::Error,
        ])?;

        let scanned = Self::scan_source(source.as_ref());
        let (volumes, descriptor) = match scanned {
            Ok(scanned) => scanned,
            Err(e) => return Err(self.fail("scan", e)),
        };

        log::info!(
            "SEG-Y headers scanned. Inlines: {}-{}, Crosslines: {}-{}, Fast Axis: {}",
            descriptor.inline_range().0,
            descriptor.inline_range().1,
            descriptor.crossline_range().0,
            descriptor.crossline_range().1,
            descriptor.fast_axis
        );
        log::debug!(
            "Depth axis: start {}, step {}, {} samples; bin size {:.3}",
            descriptor.depth_axis.start,
            descriptor.depth_axis.step,
            descriptor.depth_axis.count,
            descriptor.bin_size
        );

        self.source = Some(source);
        self.volumes = volumes;
        self.pristine = None;
        self.table = None;
        self.transform = None;
        self.result = None;
        self.state = PipelineState::GeometryScanned;
        Ok(self.descriptor.insert(descriptor))
    }

    fn scan_source(source: &dyn VolumeSource) -> ExtractResult<(Vec<VolumeId>, VolumeDescriptor)> {
        let volumes = source.list_volumes()?;
        let first = volumes
            .first()
            .ok_or_else(|| ExtractError::Path("no seismic volumes found".to_string()))?;
        log::info!("Found {} seismic volumes, reading geometry from {}", volumes.len(), first);
        let descriptor = VolumeDescriptor::from_headers(source.survey_kind(), source.read_header(first)?)?;
        Ok((volumes, descriptor))
    }

    /// Scan a folder of SEG-Y files
    pub fn scan_seismic_folder<P: AsRef<Path>>(
        &mut self,
        folder: P,
        kind: SurveyKind,
        layout: HeaderByteLayout,
        pattern: &str,
    ) -> ExtractResult<&VolumeDescriptor> {
        let source = SegyFolder::new(folder, kind)
            .and_then(|f| f.with_pattern(pattern))
            .map(|f| f.with_layout(layout));
        match source {
            Ok(source) => self.scan_geometry(Box::new(source)),
            Err(e) => Err(self.fail("scan", e)),
        }
    }

    /// Move the first depth sample, keeping step and count
    ///
    /// A loaded table is restored, since its mapping depends on the depth axis.
    pub fn override_start_depth(&mut self, start: f64) -> ExtractResult<()> {
        self.require("scan", "override start depth", &[
            PipelineState::GeometryScanned,
            PipelineState::TableLoaded,
            PipelineState::CoordsMapped,
            PipelineState::Done,
            PipelineState::Error,
        ])?;
        let descriptor = match self.descriptor.as_ref() {
            Some(d) => d,
            None => {
                return Err(stage_error(
                    "scan",
                    ExtractError::InvalidState {
                        operation: "override start depth",
                        state: self.state.to_string(),
                    },
                ))
            }
        };
        if !start.is_finite() || start < 0.0 {
            log::warn!("Start depth {} ignored, it must be a non-negative number", start);
            return Ok(());
        }

        let updated = descriptor.with_start_depth(start);
        log::info!(
            "Depth axis now spans {}-{}",
            updated.depth_axis.min(),
            updated.depth_axis.max()
        );
        self.descriptor = Some(updated);
        self.transform = None;
        self.result = None;
        self.state = match &self.pristine {
            Some(pristine) => {
                self.table = Some(pristine.clone());
                PipelineState::TableLoaded
            }
            None => PipelineState::GeometryScanned,
        };
        Ok(())
    }

    fn require_table_slot(&self) -> ExtractResult<()> {
        self.require("load-table", "load a well table", &[
            PipelineState::GeometryScanned,
            PipelineState::TableLoaded,
            PipelineState::CoordsMapped,
            PipelineState::Done,
            PipelineState::Error,
        ])?;
        if self.descriptor.is_none() {
            return Err(stage_error(
                "load-table",
                ExtractError::InvalidState { operation: "load a well table", state: self.state.to_string() },
            ));
        }
        Ok(())
    }

    /// Take ownership of a well table and keep a pristine copy of it
    pub fn load_table(&mut self, table: WellTable) -> ExtractResult<()> {
        self.require_table_slot()?;
        if table.is_empty() {
            return Err(self.fail("load-table", ExtractError::Schema("well table has no rows".to_string())));
        }

        log::info!("Well table loaded: {} samples, {} wells", table.len(), table.wells().len());
        self.pristine = Some(table.clone());
        self.table = Some(table);
        self.transform = None;
        self.result = None;
        self.state = PipelineState::TableLoaded;
        Ok(())
    }

    pub fn load_table_file<P: AsRef<Path>>(&mut self, path: P, selection: &ColumnSelection) -> ExtractResult<()> {
        self.require_table_slot()?;
        match read_well_table(path, selection) {
            Ok(table) => self.load_table(table),
            Err(e) => Err(self.fail("load-table", e)),
        }
    }

    /// Reset the well table to the state it was loaded in
    pub fn restore_table(&mut self) -> ExtractResult<()> {
        let pristine = match &self.pristine {
            Some(pristine) => pristine.clone(),
            None => {
                return Err(stage_error(
                    "load-table",
                    ExtractError::InvalidState { operation: "restore the well table", state: self.state.to_string() },
                ))
            }
        };
        self.table = Some(pristine);
        self.transform = None;
        self.result = None;
        self.state = PipelineState::TableLoaded;
        log::info!("Well table restored");
        Ok(())
    }

    /// Map wells to the grid, then align, expand and crop them
    ///
    /// Always starts from the pristine table, so it can be called again with
    /// different options.
    pub fn map_coordinates(&mut self, options: &MappingOptions) -> ExtractResult<&WellTable> {
        self.require("map-coordinates", "map coordinates", &[
            PipelineState::TableLoaded,
            PipelineState::CoordsMapped,
            PipelineState::Done,
        ])?;

        let mapped = match (self.descriptor.as_ref(), self.pristine.as_ref()) {
            (Some(descriptor), Some(pristine)) => {
                let mut table = pristine.clone();
                Self::map_table(descriptor, &mut table, options).map(|transform| (transform, table))
            }
            _ => Err(ExtractError::InvalidState { operation: "map coordinates", state: self.state.to_string() }),
        };
        let (transform, table) = match mapped {
            Ok(mapped) => mapped,
            Err(e) => return Err(self.fail("map-coordinates", e)),
        };

        if table.is_empty() {
            log::warn!("No well samples fall inside the seismic volume");
        }
        log::info!("Well coordinates mapped. {} samples inside the volume", table.len());

        self.transform = Some(transform);
        self.result = None;
        self.state = PipelineState::CoordsMapped;
        Ok(self.table.insert(table))
    }

    fn map_table(
        descriptor: &VolumeDescriptor,
        table: &mut WellTable,
        options: &MappingOptions,
    ) -> ExtractResult<CoordinateTransform> {
        let strategy = RegressionStrategy::for_survey(descriptor.kind);
        let transform = CoordinateMapper::fit(&strategy, &descriptor.geo_coords, &descriptor.grid_coords)?;
        log::debug!(
            "Coordinate transform ({:?}): coefficients {:?}, intercept {:?}",
            transform.strategy,
            transform.coefficients,
            transform.intercept
        );

        let geo: Vec<GeoPoint> = table.rows.iter().map(|r| [r.x, r.y]).collect();
        let grid = transform.apply(&geo)?;
        for (row, g) in table.rows.iter_mut().zip(grid) {
            row.grid = Some(GridPosition { inline: g[0], crossline: g[1] });
        }

        if options.bin_averaging {
            let aligner = BinAligner::new(BinGrid::from_descriptor(descriptor)?);
            aligner.align(table)?;
            let expander = NeighborhoodExpander::from_physical_radius(options.expansion_radius, descriptor.bin_size)?;
            if expander.radius_bins() > 0 {
                expander.expand(table, &aligner)?;
            }
        } else if options.expansion_radius > 0.0 {
            log::warn!("Expansion radius {} ignored without bin averaging", options.expansion_radius);
        }

        Cropper::new(descriptor).crop(table)?;
        Ok(transform)
    }

    /// Sample every volume at the mapped well positions, one column per volume
    pub fn extract(&mut self, max_parallel: usize) -> ExtractResult<&ResultTable> {
        self.require("extract", "extract attributes", &[PipelineState::CoordsMapped, PipelineState::Done])?;
        if max_parallel == 0 {
            return Err(stage_error("extract", ExtractError::Schema("max_parallel must be at least 1".to_string())));
        }

        self.state = PipelineState::Extracting;
        self.result = None;
        let started = Instant::now();

        let extracted = match (self.source.as_deref(), self.descriptor.as_ref(), self.table.as_ref()) {
            (Some(source), Some(descriptor), Some(table)) => {
                Self::extract_columns(source, &self.volumes, descriptor, table, max_parallel).and_then(|columns| {
                    let mut result = ResultTable::new(table.clone());
                    for column in columns {
                        result.push_column(column)?;
                    }
                    Ok(result)
                })
            }
            _ => Err(ExtractError::InvalidState { operation: "extract attributes", state: self.state.to_string() }),
        };
        let result = match extracted {
            Ok(result) => result,
            Err(e) => return Err(self.fail("extract", e)),
        };

        log::info!(
            "Extracted {} volumes at {} samples in {:.2} seconds",
            result.volumes.len(),
            result.len(),
            started.elapsed().as_secs_f64()
        );
        self.state = PipelineState::Done;
        Ok(self.result.insert(result))
    }

    fn extract_columns(
        source: &dyn VolumeSource,
        volumes: &[VolumeId],
        descriptor: &VolumeDescriptor,
        table: &WellTable,
        max_parallel: usize,
    ) -> ExtractResult<Vec<VolumeColumn>> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;

            if max_parallel > 1 && volumes.len() > 1 {
                let threads = max_parallel.min(volumes.len());
                log::debug!("Extracting {} volumes on {} threads", volumes.len(), threads);
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| ExtractError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
                return pool.install(|| {
                    volumes
                        .par_iter()
                        .map(|volume| Self::extract_volume(source, volume, descriptor, table))
                        .collect()
                });
            }
        }
        #[cfg(not(feature = "parallel"))]
        {
            if max_parallel > 1 {
                log::warn!("Built without parallel support, extracting volumes one at a time");
            }
        }

        volumes
            .iter()
            .map(|volume| Self::extract_volume(source, volume, descriptor, table))
            .collect()
    }

    /// Verify, load, sample and release one volume
    fn extract_volume(
        source: &dyn VolumeSource,
        volume: &VolumeId,
        reference: &VolumeDescriptor,
        table: &WellTable,
    ) -> ExtractResult<VolumeColumn> {
        let geometry = VolumeDescriptor::from_headers(source.survey_kind(), source.read_header(volume)?)?;
        reference.ensure_same_geometry(&geometry, volume.name())?;

        let traces = source.read_traces(volume)?;
        let values = extract_column(reference, traces, table)?;
        log::debug!("Volume {} sampled at {} points", volume, values.len());
        Ok(VolumeColumn { name: volume.attribute_name().to_string(), values })
    }

    pub fn result(&self) -> ExtractResult<&ResultTable> {
        match (&self.state, &self.result) {
            (PipelineState::Done, Some(result)) => Ok(result),
            _ => Err(ExtractError::InvalidState { operation: "read the result", state: self.state.to_string() }),
        }
    }

    pub fn save_result<P: AsRef<Path>>(&self, path: P, drop_columns: &[String]) -> ExtractResult<()> {
        let result = self.result().map_err(|e| stage_error("save", e))?;
        write_result_table(path, result, drop_columns).map_err(|e| stage_error("save", e))
    }

    /// Run every stage described by a parameter set and write the result
    pub fn run(&mut self, config: &ExtractionConfig) -> ExtractResult<&ResultTable> {
        config.validate()?;
        self.scan_seismic_folder(&config.seismic_folder, config.survey, config.header_bytes, &config.volume_pattern)?;
        if let Some(start) = config.start_depth {
            self.override_start_depth(start)?;
        }
        self.load_table_file(&config.well_table, &config.column_selection())?;
        self.map_coordinates(&config.mapping_options())?;
        self.extract(config.max_parallel)?;
        self.save_result(&config.result, &config.drop_columns)?;
        self.result()
    }
}
