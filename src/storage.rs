use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub data_dir: PathBuf,
    pub chunks_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub single_file_path: PathBuf,
    pub ntap_path: PathBuf,
    pub tpt_path: PathBuf,
}

impl StoragePaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir: PathBuf = data_dir.into();
        let chunks_dir = data_dir.join("codes_chunks");
        let manifest_path = chunks_dir.join("manifest.json");
        let single_file_path = data_dir.join("codes_2025.json");
        let ntap_path = data_dir.join("ntap_approved.json");
        let tpt_path = data_dir.join("tpt_approved.json");

        Self {
            data_dir,
            chunks_dir,
            manifest_path,
            single_file_path,
            ntap_path,
            tpt_path,
        }
    }
}

pub fn file_present_nonempty(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(m) => m.is_file() && m.len() > 0,
        Err(_) => false,
    }
}
