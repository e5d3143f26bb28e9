use ndarray::Array5;
use tempfile::TempDir;

use oblique_core::calibration::Calibration;
use oblique_core::geometry::{GeometryParameters, ShiftDirection};
use oblique_core::io::{allocate, read_volume};
use oblique_core::pipeline::{CancellationToken, NoOpReporter};
use oblique_core::transform::{deshear, deshear_into, deshear_shape, DeshearOptions};
use oblique_core::{Volume, VolumeShape};

fn geometry(step: f64) -> GeometryParameters {
    let tilt = 30f64.to_radians();
    GeometryParameters::new(step, step * tilt.tan(), tilt).unwrap()
}

/// Nonzero everywhere so zero padding is distinguishable.
fn ramp(shape: VolumeShape) -> Volume<u16> {
    Volume::from_array(Array5::from_shape_fn(shape.as_tuple(), |(t, c, z, y, x)| {
        (1 + t * 1000 + c * 500 + z * 50 + y * 2 + x) as u16
    }))
}

fn run(volume: &Volume<u16>, step: f64, direction: ShiftDirection) -> Volume<u16> {
    deshear(
        volume,
        &geometry(step),
        &DeshearOptions { direction },
        &NoOpReporter,
        &CancellationToken::new(),
    )
    .unwrap()
}

#[test]
fn test_output_height_grows_by_max_shift() {
    let input = ramp(VolumeShape::new(1, 1, 5, 20, 20));
    let out = run(&input, 3.0, ShiftDirection::Ascending);
    assert_eq!(out.shape(), VolumeShape::new(1, 1, 5, 32, 20));
    assert_eq!(deshear_shape(input.shape(), &geometry(3.0)), out.shape());
}

#[test]
fn test_each_slice_lands_in_its_band() {
    let input = ramp(VolumeShape::new(1, 1, 5, 20, 20));
    let out = run(&input, 3.0, ShiftDirection::Ascending);
    let (src, dst) = (input.view(), out.view());
    for z in 0..5 {
        let offset = 3 * z;
        for y in 0..32 {
            for x in 0..20 {
                let value = dst[[0, 0, z, y, x]];
                if (offset..offset + 20).contains(&y) {
                    assert_eq!(value, src[[0, 0, z, y - offset, x]]);
                } else {
                    assert_eq!(value, 0, "z={z} y={y} x={x}");
                }
            }
        }
    }
}

#[test]
fn test_descending_reverses_offsets() {
    let input = ramp(VolumeShape::new(1, 1, 5, 20, 4));
    let out = run(&input, 3.0, ShiftDirection::Descending);
    let (src, dst) = (input.view(), out.view());
    // Slice 0 sits at the bottom of the output, slice 4 at the top.
    assert_eq!(dst[[0, 0, 0, 12, 0]], src[[0, 0, 0, 0, 0]]);
    assert_eq!(dst[[0, 0, 0, 11, 0]], 0);
    assert_eq!(dst[[0, 0, 4, 0, 3]], src[[0, 0, 4, 0, 3]]);
    assert_eq!(dst[[0, 0, 4, 20, 3]], 0);
}

#[test]
fn test_zero_step_is_identity() {
    let input = ramp(VolumeShape::new(2, 2, 3, 6, 5));
    let out = run(&input, 0.0, ShiftDirection::Ascending);
    assert_eq!(out.shape(), input.shape());
    assert_eq!(out.view(), input.view());
}

#[test]
fn test_fractional_step_rounds_half_away_from_zero() {
    let input = ramp(VolumeShape::new(1, 1, 5, 4, 2));
    let out = run(&input, 0.5, ShiftDirection::Ascending);
    // Offsets are round(0.5 * z) = 0, 1, 1, 2, 2.
    assert_eq!(out.shape().y, 6);
    let (src, dst) = (input.view(), out.view());
    for (z, offset) in [0usize, 1, 1, 2, 2].into_iter().enumerate() {
        assert_eq!(dst[[0, 0, z, offset, 0]], src[[0, 0, z, 0, 0]]);
    }
}

#[test]
fn test_timepoints_and_channels_are_independent() {
    let input = ramp(VolumeShape::new(3, 2, 4, 5, 3));
    let out = run(&input, 1.0, ShiftDirection::Ascending);
    let (src, dst) = (input.view(), out.view());
    for t in 0..3 {
        for c in 0..2 {
            assert_eq!(dst[[t, c, 3, 3, 1]], src[[t, c, 3, 0, 1]]);
        }
    }
}

#[test]
fn test_deshear_into_file_backed_output() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("native.tif");
    let input = ramp(VolumeShape::new(2, 1, 5, 20, 6));
    let geometry = geometry(2.0);
    let shape = deshear_shape(input.shape(), &geometry);

    let mut target = allocate::<u16>(&path, shape, &Calibration::default()).unwrap();
    deshear_into(
        input.view(),
        target.view_mut(),
        &geometry,
        &DeshearOptions::default(),
        &NoOpReporter,
        &CancellationToken::new(),
    )
    .unwrap();
    target.finish().unwrap();

    let expected = run(&input, 2.0, ShiftDirection::Ascending);
    let (read, _) = read_volume::<u16>(&path).unwrap();
    assert_eq!(read.view(), expected.view());
}

#[test]
fn test_deshear_into_rejects_wrong_output_shape() {
    let input = ramp(VolumeShape::new(1, 1, 5, 20, 6));
    let mut out = Volume::<u16>::zeros(VolumeShape::new(1, 1, 5, 20, 6));
    let err = deshear_into(
        input.view(),
        out.view_mut(),
        &geometry(1.0),
        &DeshearOptions::default(),
        &NoOpReporter,
        &CancellationToken::new(),
    )
    .unwrap_err();
    assert!(matches!(err, oblique_core::ObliqueError::ShapeMismatch { .. }));
}
