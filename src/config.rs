// src/config.rs

use serde::Serialize;
use std::fs::File;
use std::path::Path;

#[derive(Serialize)]
pub struct RunConfig {
    pub geometry: GeometryConfig,
    pub numerics: NumericsConfig,
    pub run: RunInfo,
}

#[derive(Serialize)]
pub struct GeometryConfig {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    /// Uniform cell size (m).
    pub delta: f64,
}

#[derive(Serialize)]
pub struct NumericsConfig {
    pub dt: f64,
    pub steps: usize,
    /// Worker threads; 0 means auto-tuned.
    pub threads: usize,
    pub block_timesteps: usize,
    pub block_size: [usize; 3],
    pub verbose: u8,
}

#[derive(Serialize)]
pub struct RunInfo {
    pub binary: String,
    pub run_id: String,
}

impl RunConfig {
    pub fn write_to_dir(&self, out_dir: &Path) -> std::io::Result<()> {
        let path = out_dir.join("config.json");
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}
