use approx::assert_abs_diff_eq;
use seisextract::core::geometry::{TraceHeaderSummary, VolumeDescriptor};
use seisextract::core::volume_sampler::{reconstruct_volume, VolumeSampler};
use seisextract::types::{DepthAxis, ExtractError, FastAxis, SurveyKind};

/// Value of the synthetic field; linear, so trilinear interpolation is exact
fn field(inline: f64, crossline: f64, depth: f64) -> f64 {
    inline * 100.0 + crossline + depth * 0.5
}

/// Headers and samples of a regular survey stored with the given fast axis
fn synthetic_survey(inlines: &[f64], crosslines: &[f64], depth: DepthAxis, fast: FastAxis) -> (TraceHeaderSummary, Vec<f32>) {
    let mut pairs = Vec::new();
    match fast {
        FastAxis::Crossline => {
            for &il in inlines {
                for &xl in crosslines {
                    pairs.push([il, xl]);
                }
            }
        }
        FastAxis::Inline => {
            for &xl in crosslines {
                for &il in inlines {
                    pairs.push([il, xl]);
                }
            }
        }
    }

    let mut data = Vec::with_capacity(pairs.len() * depth.count);
    for &[il, xl] in &pairs {
        for k in 0..depth.count {
            data.push(field(il, xl, depth.value(k)) as f32);
        }
    }
    let headers = TraceHeaderSummary {
        geo_coords: pairs.iter().map(|&[il, xl]| [500.0 + 25.0 * xl, 800.0 + 25.0 * il]).collect(),
        grid_coords: pairs,
        depth_axis: depth,
    };
    (headers, data)
}

#[test]
fn test_nodes_are_exact_for_both_orientations() {
    let inlines = [10.0, 11.0, 12.0, 13.0];
    let crosslines = [200.0, 202.0, 204.0];
    let depth = DepthAxis::new(1000.0, 4.0, 5);

    for fast in [FastAxis::Crossline, FastAxis::Inline] {
        let (headers, data) = synthetic_survey(&inlines, &crosslines, depth, fast);
        let descriptor = VolumeDescriptor::from_headers(SurveyKind::Survey3D, headers)
            .expect("Failed to build descriptor");
        assert_eq!(descriptor.fast_axis, fast);

        let volume = reconstruct_volume(&descriptor, data, depth.count).expect("Failed to reconstruct volume");
        assert_eq!(volume.dim(), (4, 3, 5));

        let sampler = VolumeSampler::new(&volume, &descriptor).expect("Failed to create sampler");
        for (i, &il) in inlines.iter().enumerate() {
            for (j, &xl) in crosslines.iter().enumerate() {
                for k in 0..depth.count {
                    let z = depth.value(k);
                    let expected = field(il, xl, z) as f32;
                    assert_eq!(volume[[i, j, k]], expected, "{:?}: node ({}, {}, {})", fast, i, j, k);
                    let sampled = sampler.sample_point(il, xl, z).expect("Node query failed");
                    assert_eq!(sampled, expected as f64, "{:?}: sample at ({}, {}, {})", fast, il, xl, z);
                }
            }
        }
    }
}

#[test]
fn test_linear_field_between_nodes() {
    let (headers, data) = synthetic_survey(
        &[1.0, 2.0, 3.0],
        &[1.0, 2.0, 3.0],
        DepthAxis::new(0.0, 10.0, 3),
        FastAxis::Crossline,
    );
    let descriptor = VolumeDescriptor::from_headers(SurveyKind::Survey3D, headers).unwrap();
    let volume = reconstruct_volume(&descriptor, data, 3).unwrap();
    let sampler = VolumeSampler::new(&volume, &descriptor).unwrap();

    let points = [[1.5, 2.25, 5.0], [2.9, 1.1, 17.5], [3.0, 3.0, 20.0]];
    let values = sampler.sample(&points).expect("Sampling failed");
    assert_eq!(values.len(), points.len());
    for (value, p) in values.iter().zip(&points) {
        assert_abs_diff_eq!(*value, field(p[0], p[1], p[2]), epsilon = 1e-4);
    }
}

#[test]
fn test_out_of_range_queries_fail() {
    let (headers, data) = synthetic_survey(&[1.0, 2.0], &[1.0, 2.0, 3.0], DepthAxis::new(0.0, 1.0, 2), FastAxis::Crossline);
    let descriptor = VolumeDescriptor::from_headers(SurveyKind::Survey3D, headers).unwrap();
    let volume = reconstruct_volume(&descriptor, data, 2).unwrap();
    let sampler = VolumeSampler::new(&volume, &descriptor).unwrap();

    assert!(matches!(
        sampler.sample_point(2.5, 1.0, 0.0),
        Err(ExtractError::QueryOutOfBounds { axis: "inline", .. })
    ));
    assert!(matches!(
        sampler.sample_point(1.0, 0.5, 0.0),
        Err(ExtractError::QueryOutOfBounds { axis: "crossline", .. })
    ));
    assert!(matches!(
        sampler.sample_point(1.0, 1.0, -0.1),
        Err(ExtractError::QueryOutOfBounds { axis: "depth", .. })
    ));
}

#[test]
fn test_reconstruction_rejects_wrong_length() {
    let (headers, mut data) = synthetic_survey(&[1.0, 2.0, 3.0], &[1.0, 2.0], DepthAxis::new(0.0, 1.0, 4), FastAxis::Inline);
    let descriptor = VolumeDescriptor::from_headers(SurveyKind::Survey3D, headers).unwrap();
    data.pop();
    let result = reconstruct_volume(&descriptor, data, 4);
    assert!(matches!(result, Err(ExtractError::VolumeShape(_))));
}

#[test]
fn test_single_inline_line() {
    // A 2D line has one inline node; sampling uses it directly
    let crosslines: Vec<f64> = (0..6).map(|i| i as f64).collect();
    let (headers, data) = synthetic_survey(&[1.0], &crosslines, DepthAxis::new(0.0, 2.0, 4), FastAxis::Crossline);
    let descriptor = VolumeDescriptor::from_headers(SurveyKind::Line2D, headers).unwrap();
    assert_eq!(descriptor.inline_axis, vec![1.0]);

    let volume = reconstruct_volume(&descriptor, data, 4).unwrap();
    let sampler = VolumeSampler::new(&volume, &descriptor).unwrap();
    let value = sampler.sample_point(1.0, 2.5, 3.0).unwrap();
    assert_abs_diff_eq!(value, field(1.0, 2.5, 3.0), epsilon = 1e-4);
}

#[test]
fn test_descending_inline_order_is_rejected() {
    // Reshaping these against the ascending axis would put inline 3 data on inline 1
    let (mut headers, _) = synthetic_survey(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], DepthAxis::new(0.0, 1.0, 2), FastAxis::Crossline);
    headers.grid_coords.reverse();
    headers.geo_coords.reverse();
    let result = VolumeDescriptor::from_headers(SurveyKind::Survey3D, headers);
    assert!(matches!(result, Err(ExtractError::VolumeShape(_))));
}
