mod common;

use std::fs;

use approx::assert_relative_eq;
use ndarray::{Array3, Array4, Array5};
use tempfile::TempDir;

use common::AcquisitionLayout;
use oblique_core::acquisition::AcquisitionMetadata;
use oblique_core::calibration::Calibration;
use oblique_core::io::{
    allocate_with, incomplete_marker, parse_metadata, read_volume, write, write_array,
    WriterOptions,
};
use oblique_core::{ErrorKind, ObliqueError, Pixel, Volume, VolumeShape};

fn ramp<T: Pixel>(shape: VolumeShape) -> Volume<T> {
    Volume::from_array(Array5::from_shape_fn(shape.as_tuple(), |(t, c, z, y, x)| {
        T::from_f32(((t * 37 + c * 19 + z * 7 + y * 3 + x) % 250) as f32)
    }))
}

fn round_trip<T: Pixel>(shape: VolumeShape) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.tif");
    let volume = ramp::<T>(shape);
    let expected = volume.view().to_owned();

    let written = write(&path, volume, &Calibration::default()).unwrap();
    assert_eq!(written, path);
    assert!(!incomplete_marker(&path).exists());

    let (read, _) = read_volume::<T>(&path).unwrap();
    assert_eq!(read.shape(), shape);
    assert_eq!(read.view(), expected.view());
}

#[test]
fn test_u16_round_trip() {
    round_trip::<u16>(VolumeShape::new(3, 2, 4, 5, 6));
}

#[test]
fn test_u8_round_trip() {
    round_trip::<u8>(VolumeShape::new(2, 1, 3, 7, 5));
}

#[test]
fn test_f32_round_trip() {
    round_trip::<f32>(VolumeShape::new(1, 3, 2, 4, 4));
}

#[test]
fn test_single_plane_round_trip() {
    round_trip::<u16>(VolumeShape::new(1, 1, 1, 9, 9));
}

#[test]
fn test_calibration_from_acquisition_metadata() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cal.tif");
    let layout = AcquisitionLayout {
        channels: vec!["488", "561"],
        ..Default::default()
    };
    let meta = AcquisitionMetadata::from_map(parse_metadata(&layout.sidecar()).unwrap()).unwrap();
    let calibration = Calibration::from_metadata(&meta);

    write(&path, ramp::<u16>(VolumeShape::new(2, 2, 3, 4, 4)), &calibration).unwrap();
    let (_, read) = read_volume::<u16>(&path).unwrap();

    assert_relative_eq!(read.pixel_size_um, 0.1154, epsilon = 1e-5);
    assert_relative_eq!(
        read.z_step_um,
        0.1154 * layout.voxel_aspect_ratio(),
        epsilon = 1e-9
    );
    assert_relative_eq!(read.frame_interval_s, 0.75, epsilon = 1e-9);
    assert_eq!(read.description, "synthetic acquisition");
    assert_eq!(read.channel_labels, vec!["488", "561"]);
    assert_eq!(read.metadata.get("slices_per_volume").map(String::as_str), Some("5"));
}

#[test]
fn test_forced_bigtiff_is_readable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("big.tif");
    let shape = VolumeShape::new(2, 1, 3, 4, 5);
    let source = ramp::<u16>(shape);

    let mut target = allocate_with::<u16>(
        &path,
        shape,
        &Calibration::default(),
        &WriterOptions {
            force_bigtiff: true,
        },
    )
    .unwrap();
    target.view_mut().assign(&source.view());
    target.finish().unwrap();

    let header = fs::read(&path).unwrap();
    // BigTIFF version number.
    assert_eq!(&header[2..4], &43u16.to_le_bytes());
    let (read, _) = read_volume::<u16>(&path).unwrap();
    assert_eq!(read.view(), source.view());
}

#[test]
fn test_writing_mapped_volume_elsewhere_completes_both_files() {
    let dir = TempDir::new().unwrap();
    let staging = dir.path().join("staging.tif");
    let path = dir.path().join("copy.tif");
    let shape = VolumeShape::new(1, 2, 3, 4, 5);
    let source = ramp::<u16>(shape);

    let mut mapped = allocate_with::<u16>(
        &staging,
        shape,
        &Calibration::default(),
        &WriterOptions::default(),
    )
    .unwrap();
    mapped.view_mut().assign(&source.view());
    assert!(incomplete_marker(&staging).exists());

    write(&path, mapped, &Calibration::default()).unwrap();
    assert!(!incomplete_marker(&staging).exists());
    assert!(!incomplete_marker(&path).exists());

    let (copy, _) = read_volume::<u16>(&path).unwrap();
    let (original, _) = read_volume::<u16>(&staging).unwrap();
    assert_eq!(copy.view(), source.view());
    assert_eq!(original.view(), source.view());
}

#[test]
fn test_write_array_promotes_lower_ranks() {
    let dir = TempDir::new().unwrap();

    let zyx = Array3::<u16>::from_shape_fn((3, 4, 5), |(z, y, x)| (z * 100 + y * 10 + x) as u16);
    let path = dir.path().join("zyx.tif");
    write_array(&path, zyx.view().into_dyn(), &Calibration::default()).unwrap();
    let (read, _) = read_volume::<u16>(&path).unwrap();
    assert_eq!(read.shape(), VolumeShape::new(1, 1, 3, 4, 5));
    assert_eq!(read.view()[[0, 0, 2, 3, 4]], 234);

    let tzyx = Array4::<u8>::from_shape_fn((2, 3, 2, 2), |(t, z, _, _)| (t * 10 + z) as u8);
    let path = dir.path().join("tzyx.tif");
    write_array(&path, tzyx.view().into_dyn(), &Calibration::default()).unwrap();
    let (read, _) = read_volume::<u8>(&path).unwrap();
    assert_eq!(read.shape(), VolumeShape::new(2, 1, 3, 2, 2));
    assert_eq!(read.view()[[1, 0, 2, 1, 1]], 12);
}

#[test]
fn test_write_array_rejects_other_ranks() {
    let dir = TempDir::new().unwrap();
    let plane = ndarray::Array2::<u16>::zeros((4, 4));
    let err = write_array(
        &dir.path().join("plane.tif"),
        plane.view().into_dyn(),
        &Calibration::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ObliqueError::UnsupportedShape { ndim: 2 }));
}

#[test]
fn test_unwritable_destination_is_output_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing").join("out.tif");
    let err = write(&path, ramp::<u16>(VolumeShape::new(1, 1, 1, 2, 2)), &Calibration::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutputIo);
}

#[test]
fn test_unfinished_volume_keeps_marker() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.tif");
    {
        let mut target = allocate_with::<u16>(
            &path,
            VolumeShape::new(2, 1, 1, 2, 2),
            &Calibration::default(),
            &WriterOptions::default(),
        )
        .unwrap();
        target.view_mut().fill(5);
        target.flush_timepoints(0, 1).unwrap();
    }
    assert!(path.exists());
    assert!(incomplete_marker(&path).exists());
}
