pub mod png;
pub mod svg;

use crate::domain::instruments::InstrumentSet;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use png::PngPieChart;
pub use svg::SvgPieChart;

pub const DEFAULT_TITLE: &str = "Recommended Portfolio Weights";

// Slices run counter-clockwise from here.
pub(crate) const START_ANGLE_DEG: f64 = 140.0;
pub(crate) const PALETTE: [[u8; 3]; 10] = [
    [0x1f, 0x77, 0xb4],
    [0xff, 0x7f, 0x0e],
    [0x2c, 0xa0, 0x2c],
    [0xd6, 0x27, 0x28],
    [0x94, 0x67, 0xbd],
    [0x8c, 0x56, 0x4b],
    [0xe3, 0x77, 0xc2],
    [0x7f, 0x7f, 0x7f],
    [0xbc, 0xbd, 0x22],
    [0x17, 0xbe, 0xcf],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChartFormat {
    #[default]
    Png,
    Svg,
}

impl ChartFormat {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "svg" => Ok(Self::Svg),
            other => anyhow::bail!("unsupported chart format {other:?} (expected png or svg)"),
        }
    }

    pub fn renderer(self) -> Arc<dyn ChartRenderer> {
        match self {
            Self::Png => Arc::new(PngPieChart::default()),
            Self::Svg => Arc::new(SvgPieChart),
        }
    }
}

pub trait ChartRenderer: Send + Sync {
    fn extension(&self) -> &'static str;

    fn render(
        &self,
        out: &mut dyn Write,
        instruments: &InstrumentSet,
        weights: &[f64],
        title: &str,
    ) -> Result<()>;
}

pub fn write_chart(
    renderer: &dyn ChartRenderer,
    dir: &Path,
    instruments: &InstrumentSet,
    weights: &[f64],
) -> Result<String> {
    anyhow::ensure!(
        instruments.len() == weights.len(),
        "{} instruments but {} weights",
        instruments.len(),
        weights.len()
    );

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create chart directory {}", dir.display()))?;

    let file_name = format!(
        "portfolio_{}.{}",
        uuid::Uuid::new_v4().simple(),
        renderer.extension()
    );
    let mut file = ChartFile::create(dir.join(&file_name))?;
    renderer.render(file.writer(), instruments, weights, DEFAULT_TITLE)?;
    file.commit()?;

    tracing::debug!(%file_name, dir = %dir.display(), "wrote allocation chart");
    Ok(file_name)
}

/// Output file that is removed on drop unless `commit` succeeded.
struct ChartFile {
    path: PathBuf,
    writer: BufWriter<File>,
    committed: bool,
}

impl ChartFile {
    fn create(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .with_context(|| format!("failed to create chart file {}", path.display()))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            committed: false,
        })
    }

    fn writer(&mut self) -> &mut dyn Write {
        &mut self.writer
    }

    fn commit(mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("failed to flush chart file {}", self.path.display()))?;
        self.writer
            .get_ref()
            .sync_all()
            .with_context(|| format!("failed to sync chart file {}", self.path.display()))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for ChartFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to remove partial chart file");
        }
    }
}
