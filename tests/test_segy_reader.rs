use approx::assert_abs_diff_eq;
use seisextract::config::ExtractionConfig;
use seisextract::core::pipeline::{ExtractionPipeline, PipelineState};
use seisextract::io::segy::{SampleFormat, SegyFile, SegyTrace, SegyWriter};
use seisextract::io::volume_source::{SegyFolder, VolumeId, VolumeSource};
use seisextract::types::{ExtractError, FastAxis, SurveyKind};
use std::path::Path;
use tempfile::TempDir;

const INLINES: [i32; 3] = [10, 11, 12];
const CROSSLINES: [i32; 4] = [200, 201, 202, 203];
const SAMPLES: usize = 6;

fn node_value(inline: i32, crossline: i32, k: usize) -> f32 {
    (inline * 100 + (crossline - 200) * 10 + k as i32) as f32
}

/// Crossline-fast traces on a 25 m grid, coordinates stored in centimetres
fn synthetic_traces(offset: f32) -> Vec<SegyTrace> {
    let mut traces = Vec::new();
    for &il in &INLINES {
        for &xl in &CROSSLINES {
            traces.push(SegyTrace {
                cdp_x: (400_000 + (xl - 200) * 25) * 100,
                cdp_y: (6_000_000 + (il - 10) * 25) * 100,
                inline: il,
                crossline: xl,
                coordinate_scalar: -100,
                delay: 1000,
                samples: (0..SAMPLES).map(|k| node_value(il, xl, k) + offset).collect(),
            });
        }
    }
    traces
}

fn write_volume(dir: &Path, name: &str, format: SampleFormat, offset: f32) {
    SegyWriter::new(format, 4000)
        .write(dir.join(name), &synthetic_traces(offset))
        .expect("Failed to write SEG-Y file");
}

#[test]
fn test_round_trip_ieee_and_ibm() {
    let dir = TempDir::new().unwrap();
    write_volume(dir.path(), "ieee.sgy", SampleFormat::IeeeFloat, 0.0);
    write_volume(dir.path(), "ibm.sgy", SampleFormat::IbmFloat, 0.0);

    for name in ["ieee.sgy", "ibm.sgy"] {
        let file = SegyFile::open(dir.path().join(name)).expect("Failed to open SEG-Y file");
        assert_eq!(file.trace_count(), 12);
        assert_eq!(file.binary_header().samples_per_trace, SAMPLES);

        let headers = file.read_headers(SurveyKind::Survey3D, &Default::default()).unwrap();
        assert_eq!(headers.depth_axis.start, 1000.0);
        assert_eq!(headers.depth_axis.step, 4.0);
        assert_eq!(headers.depth_axis.count, SAMPLES);
        assert_eq!(headers.grid_coords[5], [11.0, 201.0]);
        assert_abs_diff_eq!(headers.geo_coords[5][0], 400_025.0, epsilon = 1e-6);
        assert_abs_diff_eq!(headers.geo_coords[5][1], 6_000_025.0, epsilon = 1e-6);

        let traces = file.read_traces().unwrap();
        assert_eq!(traces.trace_count(), 12);
        let expected: Vec<f32> = synthetic_traces(0.0).into_iter().flat_map(|t| t.samples).collect();
        assert_eq!(traces.data, expected, "{} samples differ", name);
    }
}

#[test]
fn test_folder_lists_matching_files_in_order() {
    let dir = TempDir::new().unwrap();
    write_volume(dir.path(), "b.segy", SampleFormat::IeeeFloat, 0.0);
    write_volume(dir.path(), "a.SGY", SampleFormat::IeeeFloat, 0.0);
    std::fs::write(dir.path().join("notes.txt"), "not seismic").unwrap();

    let folder = SegyFolder::new(dir.path(), SurveyKind::Survey3D).unwrap();
    let volumes = folder.list_volumes().unwrap();
    assert_eq!(volumes, vec![VolumeId::new("a.SGY"), VolumeId::new("b.segy")]);

    let only_b = folder.clone().with_pattern(r"^b\.").unwrap().list_volumes().unwrap();
    assert_eq!(only_b, vec![VolumeId::new("b.segy")]);
}

#[test]
fn test_line_2d_uses_trace_index() {
    let dir = TempDir::new().unwrap();
    write_volume(dir.path(), "line.sgy", SampleFormat::IeeeFloat, 0.0);
    let folder = SegyFolder::new(dir.path(), SurveyKind::Line2D).unwrap();
    let headers = folder.read_header(&VolumeId::new("line.sgy")).unwrap();
    for (i, g) in headers.grid_coords.iter().enumerate() {
        assert_eq!(*g, [1.0, i as f64]);
    }
}

#[test]
fn test_truncated_file_is_invalid() {
    let dir = TempDir::new().unwrap();
    write_volume(dir.path(), "cut.sgy", SampleFormat::IeeeFloat, 0.0);
    let path = dir.path().join("cut.sgy");
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 7]).unwrap();
    assert!(matches!(SegyFile::open(&path), Err(ExtractError::InvalidFormat(_))));

    std::fs::write(&path, &bytes[..1000]).unwrap();
    assert!(matches!(SegyFile::open(&path), Err(ExtractError::InvalidFormat(_))));
}

#[test]
fn test_full_run_from_config() {
    let dir = TempDir::new().unwrap();
    let seismic = dir.path().join("seismic");
    std::fs::create_dir(&seismic).unwrap();
    write_volume(&seismic, "amp.sgy", SampleFormat::IbmFloat, 0.0);
    write_volume(&seismic, "phase.segy", SampleFormat::IeeeFloat, 0.5);

    // Second well lies two inlines north of the survey
    let wells = dir.path().join("wells.csv");
    std::fs::write(
        &wells,
        "WELL,X,Y,TVD,GR\n\
         W1,400025,6000025,1008,55.5\n\
         W1,400025,6000025,1010,\n\
         W2,400050,6000100,1008,60\n",
    )
    .unwrap();

    let result_path = dir.path().join("result.csv");
    let config_text = format!(
        "seismic_folder = {:?}\nwell_table = {:?}\nresult = {:?}\ndrop_columns = [\"X\", \"Y\"]\nmax_parallel = 2\n\n[columns]\nwell = \"WELL\"\nx = \"X\"\ny = \"Y\"\ndepth = \"TVD\"\n",
        seismic.to_string_lossy(),
        wells.to_string_lossy(),
        result_path.to_string_lossy()
    );
    let config = ExtractionConfig::from_toml_str(&config_text).expect("Failed to parse config");

    let mut pipeline = ExtractionPipeline::new();
    let result = pipeline.run(&config).expect("Extraction run failed");
    assert_eq!(result.len(), 2);
    assert_eq!(pipeline.state(), PipelineState::Done);
    assert_eq!(pipeline.descriptor().unwrap().fast_axis, FastAxis::Crossline);

    let written = std::fs::read_to_string(&result_path).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines[0], "WELL,TVD,GR,inline,xline,amp,phase");
    assert_eq!(lines.len(), 3);

    let first: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(first[0], "W1");
    assert_eq!(first[2], "55.5");
    let amp: f64 = first[5].parse().unwrap();
    let phase: f64 = first[6].parse().unwrap();
    // inline 11, crossline 201, depth sample 2
    assert_abs_diff_eq!(amp, 1112.0, epsilon = 1e-4);
    assert_abs_diff_eq!(phase, 1112.5, epsilon = 1e-4);

    // Missing attribute stays empty
    let second: Vec<&str> = lines[2].split(',').collect();
    assert_eq!(second[2], "");
    let amp: f64 = second[5].parse().unwrap();
    assert_abs_diff_eq!(amp, 1112.5, epsilon = 1e-4);
}
