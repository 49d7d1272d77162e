//! End-to-end tests: ingest synthetic surveys, reopen them, query them
//!
//! Surveys are built with `MemorySegyReader`; sample values encode the
//! coordinate (`inline * 1000 + crossline + sample / 10`) so every read can be
//! checked against the trace it should come from.

use ndarray::s;
use tempfile::TempDir;
use tilesegy::segy::FileExtent;
use tilesegy::{
    build, infer, ingest, AccessConfig, ArrayStore, AxisRange, ChunkingConfig, Coordinate,
    DuplicatePolicy, GeometryDescriptor, HeaderCatalog, HeaderFieldMap, IngestConfig,
    MemorySegyReader, RawTraceHeader, SegyError, SegyReader, SegyVolume, SliceRequest, SortOrder,
};

const SAMPLES: usize = 5;

fn samples_for(il: i32, xl: i32) -> Vec<f32> {
    (0..SAMPLES)
        .map(|s| (il * 1000 + xl) as f32 + s as f32 / 10.0)
        .collect()
}

/// Full grid in file order `for il { for xl { .. } }`, minus `skip`
fn inline_sorted(inlines: &[i32], crosslines: &[i32], skip: &[(i32, i32)]) -> MemorySegyReader {
    let mut reader = MemorySegyReader::new(SAMPLES);
    for &il in inlines {
        for &xl in crosslines {
            if !skip.contains(&(il, xl)) {
                reader
                    .push_grid_trace(il, xl, 0, samples_for(il, xl))
                    .unwrap();
            }
        }
    }
    reader
}

/// Small chunks so every query crosses chunk boundaries
fn small_chunks() -> IngestConfig {
    IngestConfig::default().with_chunking(
        ChunkingConfig::default()
            .with_slow_tile(2)
            .with_fast_tile(3)
            .with_sample_tile(2)
            .with_trace_tile(4),
    )
}

async fn ingest_memory(reader: &MemorySegyReader, config: &IngestConfig) -> SegyVolume {
    let store = ArrayStore::memory();
    ingest(reader, &store, config).await.unwrap();
    SegyVolume::open_store(store).await.unwrap()
}

#[tokio::test]
async fn test_full_products_have_no_gaps_or_duplicates() {
    for (n, m) in [(2, 2), (3, 5), (7, 4), (10, 10)] {
        let inlines: Vec<i32> = (0..n).map(|i| 100 + i * 2).collect();
        let crosslines: Vec<i32> = (0..m).map(|i| 500 + i).collect();
        let reader = inline_sorted(&inlines, &crosslines, &[]);

        let catalog = HeaderCatalog::build(&reader, &HeaderFieldMap::default()).unwrap();
        let descriptor = infer(&catalog);
        let GeometryDescriptor::Structured3D(geometry) = &descriptor else {
            panic!("{n}x{m} survey inferred as {descriptor:?}");
        };
        assert_eq!(geometry.inline.values(), inlines.as_slice());
        assert_eq!(geometry.crossline.values(), crosslines.as_slice());
        assert!(!geometry.has_gaps);

        let (index, duplicates, gaps) = build(&catalog, &descriptor).unwrap();
        assert!(duplicates.is_empty());
        assert!(gaps.is_empty());
        assert_eq!(index.len(), (n * m) as usize);
        assert!(index.is_sequential());
    }
}

#[tokio::test]
async fn test_duplicate_keeps_first_occurrence() {
    let mut reader = inline_sorted(&[1, 2, 3], &[1, 2, 3], &[]);
    // Trace 9 repeats (2, 3) with different samples
    reader.push_grid_trace(2, 3, 0, vec![-5.0; SAMPLES]).unwrap();

    let volume = ingest_memory(&reader, &small_chunks()).await;
    let duplicates = volume.duplicates();
    assert_eq!(duplicates.len(), 1);
    let warning = duplicates.iter().next().unwrap();
    assert_eq!(warning.coordinate, Coordinate::new(2, 3, 0));
    assert_eq!(warning.kept, 5);
    assert_eq!(warning.discarded, 9);

    assert_eq!(volume.index().unwrap().get(&Coordinate::new(2, 3, 0)), Some(5));
    assert_eq!(volume.get_by_coordinate(2, 3, 0).await.unwrap(), samples_for(2, 3));
    assert_eq!(volume.get_trace(9).await.unwrap(), vec![-5.0; SAMPLES]);
}

#[tokio::test]
async fn test_rejecting_duplicates_aborts_ingestion() {
    let mut reader = inline_sorted(&[1, 2], &[1, 2], &[]);
    reader.push_grid_trace(1, 1, 0, vec![0.0; SAMPLES]).unwrap();

    let store = ArrayStore::memory();
    let config = IngestConfig::default().with_duplicate_policy(DuplicatePolicy::Reject);
    let err = ingest(&reader, &store, &config).await.unwrap_err();
    assert!(matches!(err, SegyError::DuplicateCoordinate { first: 0, duplicate: 4, .. }));
    assert!(SegyVolume::open_store(store).await.is_err());
}

#[tokio::test]
async fn test_single_missing_coordinate_is_the_only_gap() {
    for missing in [(1, 10), (2, 12), (3, 13)] {
        let reader = inline_sorted(&[1, 2, 3], &[10, 11, 12, 13], &[missing]);
        let volume = ingest_memory(&reader, &small_chunks()).await;

        let gaps: Vec<Coordinate> = volume.gaps().iter().copied().collect();
        assert_eq!(gaps, vec![Coordinate::new(missing.0, missing.1, 0)]);

        let err = volume
            .get_by_coordinate(missing.0, missing.1, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, SegyError::Gap(_)), "got {err:?}");
        assert!(err.is_recoverable());

        // The volume stays usable after a failed query
        assert_eq!(volume.get_trace(0).await.unwrap().len(), SAMPLES);
    }
}

#[tokio::test]
async fn test_full_slice_matches_every_trace() {
    let reader = inline_sorted(&[5, 6, 7, 8, 9], &[20, 22, 24, 26], &[(6, 22), (9, 26)]);
    let volume = ingest_memory(&reader, &small_chunks()).await;

    let slice = volume.get_slice(&SliceRequest::all()).await.unwrap();
    assert_eq!(slice.shape(), &[5, 4, 1, SAMPLES]);

    let geometry = volume.geometry().structured().unwrap().clone();
    let index = volume.index().unwrap();
    for (coordinate, trace) in index.iter() {
        let [il, xl, off] = geometry.position(&coordinate).unwrap();
        let from_slice: Vec<f32> = (0..SAMPLES).map(|s| slice[[il, xl, off, s]]).collect();
        assert_eq!(from_slice, volume.get_trace(trace).await.unwrap(), "at {coordinate}");
        assert_eq!(
            from_slice,
            samples_for(coordinate.inline, coordinate.crossline)
        );
    }
    // Gap cells hold the default fill value
    assert!((0..SAMPLES).all(|s| slice[[1, 1, 0, s]] == 0.0));
}

#[tokio::test]
async fn test_crossline_fastest_scenario() {
    // Inlines written in descending order, crosslines vary fastest
    let reader = inline_sorted(&[40, 30, 20, 10], &[7, 8, 9], &[]);
    let volume = ingest_memory(&reader, &IngestConfig::default()).await;

    assert_eq!(volume.sorting(), Some(SortOrder::InlineSorted));
    assert_eq!(
        volume.sorting().map(|s| s.fast_axis().as_str()),
        Some("crossline")
    );
    assert_eq!(volume.axis_values("inline").unwrap(), &[10, 20, 30, 40]);
    assert_eq!(volume.axis_values("crossline").unwrap(), &[7, 8, 9]);

    assert_eq!(volume.get_by_coordinate(30, 8, 0).await.unwrap(), samples_for(30, 8));
    let line = volume.inline(10).await.unwrap();
    assert_eq!(line.shape(), &[3, 1, SAMPLES]);
    assert_eq!(line[[2, 0, 0]], samples_for(10, 9)[0]);
}

#[tokio::test]
async fn test_inline_fastest_file_order() {
    let mut reader = MemorySegyReader::new(SAMPLES);
    for xl in [1, 2, 3, 4] {
        for il in [100, 101, 102] {
            reader.push_grid_trace(il, xl, 0, samples_for(il, xl)).unwrap();
        }
    }
    let volume = ingest_memory(&reader, &small_chunks()).await;
    assert_eq!(volume.sorting(), Some(SortOrder::CrosslineSorted));
    assert!(volume.metadata().index.as_ref().unwrap().sequential);

    let column = volume.crossline(3).await.unwrap();
    assert_eq!(column.shape(), &[3, 1, SAMPLES]);
    assert_eq!(column[[1, 0, 4]], samples_for(101, 3)[4]);
}

#[tokio::test]
async fn test_single_inline_is_structured() {
    let reader = inline_sorted(&[42], &[1, 2, 3, 4, 5, 6], &[]);
    let volume = ingest_memory(&reader, &small_chunks()).await;

    let GeometryDescriptor::Structured2D(geometry) = volume.geometry() else {
        panic!("single inline inferred as {:?}", volume.geometry());
    };
    assert_eq!(geometry.inline.len(), 1);
    assert_eq!(geometry.crossline.len(), 6);

    let line = volume.inline(42).await.unwrap();
    assert_eq!(line[[5, 0, 1]], samples_for(42, 6)[1]);
}

#[tokio::test]
async fn test_inference_is_idempotent() {
    let reader = inline_sorted(&[1, 3, 5], &[2, 4, 6, 8], &[(3, 4)]);
    let catalog = HeaderCatalog::build(&reader, &HeaderFieldMap::default()).unwrap();

    let first = infer(&catalog);
    let second = infer(&catalog);
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );

    let (index_a, dups_a, gaps_a) = build(&catalog, &first).unwrap();
    let (index_b, dups_b, gaps_b) = build(&catalog, &second).unwrap();
    assert_eq!(index_a, index_b);
    assert_eq!(dups_a, dups_b);
    assert_eq!(gaps_a, gaps_b);
    assert_eq!(index_a.to_persisted(), index_b.to_persisted());
}

#[tokio::test]
async fn test_unstructured_survey_serves_physical_traces() {
    let mut reader = MemorySegyReader::new(SAMPLES);
    for trace in 0..6 {
        reader
            .push_grid_trace(1, 1, trace * 50, samples_for(trace, 0))
            .unwrap();
    }
    let volume = ingest_memory(&reader, &small_chunks()).await;

    assert!(matches!(
        volume.geometry(),
        GeometryDescriptor::Unstructured { trace_count: 6 }
    ));
    assert_eq!(volume.get_trace(4).await.unwrap(), samples_for(4, 0));
    assert!(matches!(
        volume.axis_values("inline"),
        Err(SegyError::UnstructuredSurvey(_))
    ));
    assert_eq!(
        volume.header_column("offset", 0..6).await.unwrap(),
        vec![0, 50, 100, 150, 200, 250]
    );
}

#[tokio::test]
async fn test_filesystem_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let url = format!("file://{}", temp_dir.path().display());

    let reader = inline_sorted(&[1, 2, 3], &[1, 2, 3, 4], &[(2, 2)])
        .with_text_header("C01 CLIENT: TEST")
        .with_binary_field("SAMPLE_INTERVAL", 2000);
    let store = ArrayStore::open(&url).await.unwrap();
    let descriptor = ingest(&reader, &store, &small_chunks()).await.unwrap();
    drop(store);

    let volume = SegyVolume::open(&url).await.unwrap();
    assert_eq!(volume.geometry(), &descriptor);
    assert_eq!(volume.text(), &["C01 CLIENT: TEST".to_string()]);
    assert_eq!(volume.bin().get("SAMPLE_INTERVAL"), Some(&2000));
    assert_eq!(volume.get_by_coordinate(3, 4, 0).await.unwrap(), samples_for(3, 4));

    let slice = volume
        .get_slice(
            &SliceRequest::all()
                .with_inline(AxisRange::new(2, 4))
                .with_crossline(AxisRange::all().with_step(-1))
                .with_samples(1..4),
        )
        .await
        .unwrap();
    assert_eq!(slice.shape(), &[2, 4, 1, 3]);
    // Crosslines walk backwards: 4, 3, 2, 1
    assert_eq!(slice[[0, 0, 0, 0]], samples_for(2, 4)[1]);
    assert_eq!(slice[[1, 3, 0, 2]], samples_for(3, 1)[3]);
}

#[tokio::test]
async fn test_truncated_file_writes_nothing() {
    let reader = inline_sorted(&[1, 2], &[1, 2], &[]);
    let exact = FileExtent::standard(3600 + 4 * (240 + SAMPLES as u64 * 4), SAMPLES, 4);
    let truncated = FileExtent {
        file_size: exact.file_size - 100,
        ..exact
    };

    let store = ArrayStore::memory();
    let err = ingest(&reader.clone().with_extent(truncated), &store, &IngestConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SegyError::TruncatedFile { trace_count: 4, .. }));
    assert!(store.io().list("").await.unwrap().is_empty());

    ingest(&reader.with_extent(exact), &store, &IngestConfig::default())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_corrupt_header_aborts_ingestion() {
    let mut reader = inline_sorted(&[1, 2], &[1, 2], &[]);
    let mut header = RawTraceHeader::new();
    header.insert("CROSSLINE_3D".to_string(), 3);
    reader.push_trace(header, vec![0.0; SAMPLES]).unwrap();

    let store = ArrayStore::memory();
    let err = ingest(&reader, &store, &IngestConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SegyError::CorruptHeader { trace: 4, .. }));
    assert!(SegyVolume::open_store(store).await.is_err());
}

#[tokio::test]
async fn test_custom_header_fields() {
    let mut reader = MemorySegyReader::new(SAMPLES);
    for il in [1, 2] {
        for xl in [1, 2, 3] {
            let mut header = RawTraceHeader::new();
            header.insert("FieldRecord".to_string(), il.into());
            header.insert("CDP".to_string(), xl.into());
            reader.push_trace(header, samples_for(il, xl)).unwrap();
        }
    }
    assert_eq!(reader.trace_count(), 6);

    let config = IngestConfig::default().with_header_fields(
        HeaderFieldMap::default()
            .with_inline("FieldRecord")
            .with_crossline("CDP"),
    );
    let volume = ingest_memory(&reader, &config).await;
    assert!(volume.is_structured());
    assert_eq!(volume.get_by_coordinate(2, 1, 0).await.unwrap(), samples_for(2, 1));
    assert_eq!(volume.header_fields(), &["CDP".to_string(), "FieldRecord".to_string()]);
}

fn prestack_samples(il: i32, xl: i32, off: i32) -> Vec<f32> {
    (0..SAMPLES)
        .map(|s| (off * 100 + il * 10 + xl - 10) as f32 + s as f32 / 10.0)
        .collect()
}

#[tokio::test]
async fn test_prestack_survey_round_trip() {
    let mut reader = MemorySegyReader::new(SAMPLES);
    for il in [1, 2, 3] {
        for xl in [10, 11, 12] {
            for off in [100, 200, 300] {
                if (il, xl, off) != (2, 11, 200) {
                    reader
                        .push_grid_trace(il, xl, off, prestack_samples(il, xl, off))
                        .unwrap();
                }
            }
        }
    }

    let store = ArrayStore::memory();
    ingest(&reader, &store, &small_chunks()).await.unwrap();
    let volume = SegyVolume::open_store(store)
        .await
        .unwrap()
        .with_config(AccessConfig::default().with_fill_value(-7.0));

    let geometry = volume.geometry().structured().unwrap();
    assert!(geometry.is_prestack());
    assert_eq!(geometry.sorting, SortOrder::InlineSorted);
    assert_eq!(volume.axis_values("offset").unwrap(), &[100, 200, 300]);
    assert_eq!(volume.gaps().len(), 1);
    assert_eq!(volume.trace_count(), 26);

    // Every offset of a cell lands in one chunk
    let data = volume
        .store()
        .open_array::<f32>(&volume.metadata().arrays.data)
        .await
        .unwrap();
    assert_eq!(data.shape(), &[3, 3, 3, SAMPLES]);
    assert_eq!(data.layout().chunk_shape[2], 3);

    assert_eq!(
        volume.get_by_coordinate(3, 12, 300).await.unwrap(),
        prestack_samples(3, 12, 300)
    );
    assert_eq!(
        volume.get_by_coordinate(2, 11, 100).await.unwrap(),
        prestack_samples(2, 11, 100)
    );
    assert!(matches!(
        volume.get_by_coordinate(2, 11, 200).await,
        Err(SegyError::Gap(c)) if c == Coordinate::new(2, 11, 200)
    ));
    assert!(matches!(
        volume.get_by_coordinate(2, 11, 250).await,
        Err(SegyError::CoordinateOutOfRange(_))
    ));

    let slice = volume
        .get_slice(&SliceRequest::all().with_offset(AxisRange::new(200, 301)))
        .await
        .unwrap();
    assert_eq!(slice.shape(), &[3, 3, 2, SAMPLES]);
    assert!(slice.slice(s![1, 1, 0, ..]).iter().all(|&v| v == -7.0));
    assert_eq!(slice.slice(s![1, 1, 1, ..]).to_vec(), prestack_samples(2, 11, 300));
    assert_eq!(slice.slice(s![0, 2, 0, ..]).to_vec(), prestack_samples(1, 12, 200));

    let line = volume.inline(2).await.unwrap();
    assert_eq!(line.shape(), &[3, 3, SAMPLES]);
    assert!(line.slice(s![1, 1, ..]).iter().all(|&v| v == -7.0));

    // Physical traces 12 and 13 are the two offsets recorded at (2, 11)
    let block = volume.get_traces(12..14, None).await.unwrap();
    assert_eq!(block.row(0).to_vec(), prestack_samples(2, 11, 100));
    assert_eq!(block.row(1).to_vec(), prestack_samples(2, 11, 300));
}
