mod common;

use tempfile::TempDir;

use common::{
    build_acquisition, buffer_name, expected_value, raw_page, write_pages_u16, AcquisitionLayout,
    TIMING_SENTINEL,
};
use oblique_core::acquisition::AcquisitionIndex;
use oblique_core::assemble::{assemble, assemble_buffer, assemble_with, OutputTarget};
use oblique_core::calibration::Calibration;
use oblique_core::io::{allocate, incomplete_marker, read_volume};
use oblique_core::pipeline::{CancellationToken, NoOpReporter};
use oblique_core::{ErrorKind, ObliqueError, PixelType, Volume, VolumeShape};

fn assert_matches_pattern(volume: &Volume<u16>) {
    let view = volume.view();
    for ((t, c, z, y, x), &v) in view.indexed_iter() {
        assert_eq!(v, expected_value(t, c, z, y, x), "at {:?}", (t, c, z, y, x));
    }
    assert!(view.iter().all(|&v| v != TIMING_SENTINEL));
}

#[test]
fn test_assemble_in_memory() {
    let dir = TempDir::new().unwrap();
    build_acquisition(dir.path(), &AcquisitionLayout::default());
    let index = AcquisitionIndex::build(dir.path()).unwrap();

    let volume = assemble::<u16>(&index, OutputTarget::InMemory).unwrap();
    assert_eq!(volume.shape(), VolumeShape::new(4, 1, 5, 20, 6));
    assert!(!volume.is_file_backed());
    assert_matches_pattern(&volume);
}

#[test]
fn test_multi_channel_pages_are_deinterleaved() {
    let dir = TempDir::new().unwrap();
    let layout = AcquisitionLayout {
        channels: vec!["488", "405", "561"],
        slices: 3,
        ..Default::default()
    };
    build_acquisition(dir.path(), &layout);
    let index = AcquisitionIndex::build(dir.path()).unwrap();

    let volume = assemble::<u16>(&index, OutputTarget::InMemory).unwrap();
    assert_eq!(volume.shape().c, 3);
    assert_matches_pattern(&volume);
}

#[test]
fn test_assemble_into_file() {
    let dir = TempDir::new().unwrap();
    let acq = dir.path().join("acq");
    build_acquisition(&acq, &AcquisitionLayout::default());
    let index = AcquisitionIndex::build(&acq).unwrap();

    let path = dir.path().join("raw.tif");
    let target = allocate::<u16>(&path, index.shape(), &Calibration::default()).unwrap();
    let volume = assemble(&index, OutputTarget::File(target)).unwrap();
    assert!(volume.is_file_backed());
    assert!(incomplete_marker(&path).exists());
    assert_matches_pattern(&volume);
    volume.finish().unwrap();
    assert!(!incomplete_marker(&path).exists());

    let (read, _) = read_volume::<u16>(&path).unwrap();
    assert_matches_pattern(&read);
}

#[test]
fn test_file_target_shape_must_match() {
    let dir = TempDir::new().unwrap();
    let acq = dir.path().join("acq");
    build_acquisition(&acq, &AcquisitionLayout::default());
    let index = AcquisitionIndex::build(&acq).unwrap();

    let target = allocate::<u16>(
        &dir.path().join("bad.tif"),
        index.shape().with_t(1),
        &Calibration::default(),
    )
    .unwrap();
    let err = assemble(&index, OutputTarget::File(target)).unwrap_err();
    assert!(matches!(err, ObliqueError::ShapeMismatch { .. }));
}

#[test]
fn test_short_buffer_is_read_error() {
    let dir = TempDir::new().unwrap();
    let layout = AcquisitionLayout::default();
    build_acquisition(dir.path(), &layout);
    // Second buffer is missing its last page.
    let mut pages = Vec::new();
    for t in 0..layout.volumes_per_buffer {
        for z in 0..layout.slices {
            pages.push(raw_page(&layout, 1, t, z, 0));
        }
    }
    pages.pop();
    write_pages_u16(&dir.path().join("data").join(buffer_name(1)), &pages);

    let index = AcquisitionIndex::build(dir.path()).unwrap();
    let err = assemble::<u16>(&index, OutputTarget::InMemory).unwrap_err();
    assert!(matches!(err, ObliqueError::BufferRead { .. }), "{err}");
    assert_eq!(err.kind(), ErrorKind::InputIo);
}

#[test]
fn test_requested_type_must_match() {
    let dir = TempDir::new().unwrap();
    build_acquisition(dir.path(), &AcquisitionLayout::default());
    let index = AcquisitionIndex::build(dir.path()).unwrap();
    let err = assemble::<f32>(&index, OutputTarget::InMemory).unwrap_err();
    assert!(matches!(
        err,
        ObliqueError::DtypeMismatch {
            expected: PixelType::F32,
            found: PixelType::U16,
            ..
        }
    ));
}

#[test]
fn test_assemble_single_buffer() {
    let dir = TempDir::new().unwrap();
    build_acquisition(dir.path(), &AcquisitionLayout::default());
    let index = AcquisitionIndex::build(dir.path()).unwrap();

    let buffer = assemble_buffer::<u16>(&index, 1).unwrap();
    assert_eq!(buffer.shape(), VolumeShape::new(2, 1, 5, 20, 6));
    let view = buffer.view();
    // Buffer 1 holds global timepoints 2 and 3.
    assert_eq!(view[[0, 0, 3, 4, 5]], expected_value(2, 0, 3, 4, 5));
    assert_eq!(view[[1, 0, 0, 0, 0]], expected_value(3, 0, 0, 0, 0));
}

#[test]
fn test_cancellation_between_buffers() {
    let dir = TempDir::new().unwrap();
    build_acquisition(dir.path(), &AcquisitionLayout::default());
    let index = AcquisitionIndex::build(dir.path()).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = assemble_with::<u16>(&index, OutputTarget::InMemory, &NoOpReporter, &cancel)
        .unwrap_err();
    assert!(matches!(err, ObliqueError::Cancelled { completed: 0, total: 2 }));
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}
