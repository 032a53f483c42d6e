use std::path::Path;

use anyhow::{Context, anyhow};
use serde::Deserialize;

use crate::ntap::NtapProgram;
use crate::record::{CodeRecord, RawCode};
use crate::storage::{StoragePaths, file_present_nonempty};
use crate::tpt::TptProgram;

/// Chunk manifest written by the dataset splitter.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub chunk_count: usize,
    pub total_codes: usize,
    pub chunks: Vec<ChunkInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkInfo {
    pub file_name: String,
}

/// Load the full code collection: chunked files when a manifest is present,
/// otherwise the single-file fallback. Any missing file, malformed JSON, or
/// invalid record is fatal; the caller must not serve a half-built dataset.
pub fn load_codes(paths: &StoragePaths) -> anyhow::Result<Vec<CodeRecord>> {
    let t0 = std::time::Instant::now();
    let records = if file_present_nonempty(&paths.manifest_path) {
        load_from_chunks(paths)?
    } else {
        load_from_single_file(&paths.single_file_path)?
    };
    tracing::info!(
        "Loaded {} codes in {:.1}s",
        records.len(),
        t0.elapsed().as_secs_f64()
    );
    Ok(records)
}

fn load_from_chunks(paths: &StoragePaths) -> anyhow::Result<Vec<CodeRecord>> {
    let manifest_raw = std::fs::read_to_string(&paths.manifest_path)
        .with_context(|| format!("read {}", paths.manifest_path.display()))?;
    let manifest: Manifest = serde_json::from_str(&manifest_raw)
        .with_context(|| format!("parse {}", paths.manifest_path.display()))?;

    tracing::info!(
        "Loading codes from {} chunks ({} total codes expected)",
        manifest.chunk_count,
        manifest.total_codes
    );

    let mut records = Vec::with_capacity(manifest.total_codes);
    for chunk in &manifest.chunks {
        let chunk_path = paths.chunks_dir.join(&chunk.file_name);
        let t0 = std::time::Instant::now();
        let count = load_file_into(&chunk_path, &mut records)?;
        tracing::info!(
            "  Loaded {}: {} codes ({}ms)",
            chunk.file_name,
            count,
            t0.elapsed().as_millis()
        );
    }
    Ok(records)
}

fn load_from_single_file(path: &Path) -> anyhow::Result<Vec<CodeRecord>> {
    if !file_present_nonempty(path) {
        return Err(anyhow!(
            "No code dataset found: expected a chunk manifest or {}",
            path.display()
        ));
    }
    tracing::info!("Loading codes from single file: {}", path.display());
    let mut records = Vec::new();
    load_file_into(path, &mut records)?;
    Ok(records)
}

fn load_file_into(path: &Path, records: &mut Vec<CodeRecord>) -> anyhow::Result<usize> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let codes: Vec<RawCode> =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    let count = codes.len();
    for (i, raw_code) in codes.into_iter().enumerate() {
        let record = CodeRecord::from_raw(raw_code)
            .with_context(|| format!("invalid record {} in {}", i, path.display()))?;
        records.push(record);
    }
    Ok(count)
}

pub fn load_ntap_program(paths: &StoragePaths) -> anyhow::Result<NtapProgram> {
    let raw = std::fs::read_to_string(&paths.ntap_path)
        .with_context(|| format!("read {}", paths.ntap_path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", paths.ntap_path.display()))
}

pub fn load_tpt_program(paths: &StoragePaths) -> anyhow::Result<TptProgram> {
    let raw = std::fs::read_to_string(&paths.tpt_path)
        .with_context(|| format!("read {}", paths.tpt_path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", paths.tpt_path.display()))
}
