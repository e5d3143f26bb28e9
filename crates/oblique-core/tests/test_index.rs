mod common;

use std::fs;

use ndarray::Array2;
use tempfile::TempDir;

use common::{build_acquisition, buffer_name, raw_page, write_pages_u16, write_pages_u8, AcquisitionLayout};
use oblique_core::acquisition::{AcquisitionIndex, AcquisitionMetadata};
use oblique_core::io::parse_metadata;
use oblique_core::{ErrorKind, ObliqueError, PixelType, VolumeShape};

#[test]
fn test_logical_shape() {
    let dir = TempDir::new().unwrap();
    let layout = AcquisitionLayout::default();
    build_acquisition(dir.path(), &layout);

    let index = AcquisitionIndex::build(dir.path()).unwrap();
    assert_eq!(index.shape(), VolumeShape::new(4, 1, 5, 20, layout.width));
    assert_eq!(index.buffers().len(), 2);
    assert_eq!(index.frame_shape(), (28, layout.width));
    assert_eq!(index.pixel_type(), PixelType::U16);
    assert_eq!(index.volumes_per_buffer(), 2);
    assert_eq!(index.raw_bytes(), 4 * 5 * 20 * layout.width * 2);
}

#[test]
fn test_num_volumes_scales_with_buffers() {
    for buffers in [1, 3] {
        let dir = TempDir::new().unwrap();
        let layout = AcquisitionLayout {
            buffers,
            volumes_per_buffer: 3,
            channels: vec!["488", "561"],
            slices: 2,
            ..Default::default()
        };
        build_acquisition(dir.path(), &layout);
        let index = AcquisitionIndex::build(dir.path()).unwrap();
        assert_eq!(index.shape().t, 3 * buffers);
        assert_eq!(index.shape().c, 2);
        assert_eq!(index.pages_per_buffer(), 3 * 2 * 2);
    }
}

#[test]
fn test_discovery_order_does_not_matter() {
    let dir = TempDir::new().unwrap();
    let layout = AcquisitionLayout {
        buffers: 4,
        volumes_per_buffer: 1,
        ..Default::default()
    };
    let sorted = build_acquisition(dir.path(), &layout);
    let meta = AcquisitionMetadata::from_map(parse_metadata(&layout.sidecar()).unwrap()).unwrap();

    let shuffled = vec![
        sorted[2].clone(),
        sorted[0].clone(),
        sorted[3].clone(),
        sorted[1].clone(),
    ];
    let index = AcquisitionIndex::from_parts(shuffled, meta).unwrap();
    assert_eq!(index.buffers(), sorted.as_slice());
}

#[test]
fn test_time_range_and_page_index() {
    let dir = TempDir::new().unwrap();
    let layout = AcquisitionLayout {
        channels: vec!["488", "405"],
        ..Default::default()
    };
    build_acquisition(dir.path(), &layout);
    let index = AcquisitionIndex::build(dir.path()).unwrap();

    assert_eq!(index.time_range(0), 0..2);
    assert_eq!(index.time_range(1), 2..4);
    // ((t * Z) + z) * C + c
    assert_eq!(index.page_index(0, 0, 1), 1);
    assert_eq!(index.page_index(1, 2, 0), 14);
}

#[test]
fn test_missing_data_directory() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("metadata")).unwrap();
    let err = AcquisitionIndex::build(dir.path()).unwrap_err();
    assert!(matches!(err, ObliqueError::MissingData(_)));
    assert_eq!(err.kind(), ErrorKind::InputIo);
}

#[test]
fn test_empty_data_directory() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("data")).unwrap();
    fs::write(dir.path().join("data").join("notes.txt"), "not a buffer").unwrap();
    assert!(matches!(
        AcquisitionIndex::build(dir.path()),
        Err(ObliqueError::MissingData(_))
    ));
}

#[test]
fn test_missing_metadata() {
    let dir = TempDir::new().unwrap();
    build_acquisition(dir.path(), &AcquisitionLayout::default());
    fs::remove_file(dir.path().join("metadata").join("000000.txt")).unwrap();
    assert!(matches!(
        AcquisitionIndex::build(dir.path()),
        Err(ObliqueError::MissingMetadata(_))
    ));
}

#[test]
fn test_first_metadata_file_wins() {
    let dir = TempDir::new().unwrap();
    let layout = AcquisitionLayout::default();
    build_acquisition(dir.path(), &layout);
    let other = layout.sidecar().replace("slices_per_volume: 5", "slices_per_volume: 9");
    fs::write(dir.path().join("metadata").join("000001.txt"), other).unwrap();

    let index = AcquisitionIndex::build(dir.path()).unwrap();
    assert_eq!(index.metadata().slices_per_volume, 5);
}

#[test]
fn test_frame_shape_mismatch() {
    let dir = TempDir::new().unwrap();
    let layout = AcquisitionLayout::default();
    build_acquisition(dir.path(), &layout);
    let wider = AcquisitionLayout {
        width: layout.width + 2,
        ..layout.clone()
    };
    write_pages_u16(
        &dir.path().join("data").join(buffer_name(1)),
        &[raw_page(&wider, 1, 0, 0, 0)],
    );

    let err = AcquisitionIndex::build(dir.path()).unwrap_err();
    match err {
        ObliqueError::ShapeMismatch { expected, found, .. } => {
            assert_eq!(expected, vec![28, layout.width]);
            assert_eq!(found, vec![28, layout.width + 2]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_pixel_type_mismatch() {
    let dir = TempDir::new().unwrap();
    let layout = AcquisitionLayout::default();
    build_acquisition(dir.path(), &layout);
    write_pages_u8(
        &dir.path().join("data").join(buffer_name(1)),
        &[Array2::<u8>::zeros((layout.height, layout.width))],
    );

    let err = AcquisitionIndex::build(dir.path()).unwrap_err();
    assert!(matches!(
        err,
        ObliqueError::DtypeMismatch {
            expected: PixelType::U16,
            found: PixelType::U8,
            ..
        }
    ));
}

#[test]
fn test_frames_without_image_rows_rejected() {
    let dir = TempDir::new().unwrap();
    let layout = AcquisitionLayout {
        buffers: 1,
        height: 8,
        ..Default::default()
    };
    build_acquisition(dir.path(), &layout);
    assert!(matches!(
        AcquisitionIndex::build(dir.path()),
        Err(ObliqueError::ShapeMismatch { .. })
    ));
}
