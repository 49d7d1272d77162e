//! Example: convert a synthetic prestack survey and query it
//!
//! Run with: RUST_LOG=tilesegy=debug cargo run --example ingest_survey

use anyhow::Context;
use tilesegy::{
    ingest, ArrayStore, AxisRange, ChunkingConfig, CompressionLevel, CompressionMethod,
    IngestConfig, MemorySegyReader, SegyError, SegyVolume, SliceRequest,
};
use tracing_subscriber::EnvFilter;

const SAMPLES: usize = 250;

/// 20 inlines x 30 crosslines x 3 offsets, with a few missing traces
fn synthetic_survey() -> anyhow::Result<MemorySegyReader> {
    let mut reader = MemorySegyReader::new(SAMPLES)
        .with_text_header("C01 SYNTHETIC SURVEY")
        .with_binary_field("SAMPLE_INTERVAL", 4000)
        .with_sample_axis((0..SAMPLES).map(|i| i as f64 * 4.0).collect());

    for il in 1000..1020 {
        for xl in (2000..2060).step_by(2) {
            if (il + xl) % 37 == 0 {
                continue;
            }
            for offset in [100, 200, 300] {
                let samples = (0..SAMPLES)
                    .map(|t| ((t as f32) * 0.05 + il as f32 * 0.01).sin() * offset as f32)
                    .collect();
                reader.push_grid_trace(il, xl, offset, samples)?;
            }
        }
    }
    Ok(reader)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let reader = synthetic_survey()?;
    let dir = tempfile::tempdir()?;
    let url = format!("file://{}", dir.path().display());

    let config = IngestConfig::default().with_chunking(
        ChunkingConfig::default()
            .with_fast_tile(16)
            .with_compression(CompressionMethod::Zstd, CompressionLevel::fast()),
    );
    let store = ArrayStore::open(&url).await?;
    ingest(&reader, &store, &config)
        .await
        .context("ingesting synthetic survey")?;

    let volume = SegyVolume::open(&url).await?;
    println!("{}", volume.summary());
    println!("inlines:   {:?}", volume.axis_values("inline")?);
    println!("offsets:   {:?}", volume.axis_values("offset")?);
    println!("gaps:      {}", volume.gaps().len());

    let trace = volume.get_by_coordinate(1005, 2010, 200).await?;
    println!("trace (1005, 2010, 200): {} samples, first {:.3}", trace.len(), trace[0]);

    let gap = volume.gaps().iter().next().copied();
    if let Some(c) = gap {
        match volume.get_by_coordinate(c.inline, c.crossline, c.offset).await {
            Err(SegyError::Gap(_)) => println!("gap at {} reported as expected", c),
            other => anyhow::bail!("expected a gap at {}, got {:?}", c, other.map(|t| t.len())),
        }
    }

    let cube = volume
        .get_slice(
            &SliceRequest::all()
                .with_inline(AxisRange::new(1000, 1010).with_step(2))
                .with_offset(AxisRange::single(300))
                .with_samples(0..100),
        )
        .await?;
    println!("slice shape: {:?}", cube.shape());

    let time_slice = volume.depth_slice(50).await?;
    println!("depth slice at {} ms: {:?}", volume.samples()[50], time_slice.shape());
    Ok(())
}
