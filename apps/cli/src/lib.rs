//! Conversion driver behind the `maskview` binary.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use maskview_core::{BBox, Engines, LayerStack};
use maskview_io::{GdsLibrary, GdsReader};
use maskview_render::{assemble_stack, write_data, write_page, LayerRecord};

/// Inputs of one conversion run.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Directory holding `index.html` and `bundle.js` for page output.
    /// The binary always uses the working directory.
    pub assets_dir: PathBuf,
}

impl Conversion {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            assets_dir: PathBuf::from("."),
        }
    }

    pub fn with_assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = dir.into();
        self
    }

    /// Page output is chosen by an `.html` suffix.
    pub fn writes_page(&self) -> bool {
        self.output.extension().is_some_and(|ext| ext == "html")
    }
}

struct PageAssets {
    template: String,
    bundle: String,
}

fn read_asset(dir: &Path, name: &str) -> Result<String> {
    log::info!("Reading {}", name);
    let path = dir.join(name);
    fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))
}

fn load_library(path: &Path) -> Result<GdsLibrary> {
    log::info!("Loading {}", path.display());
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    GdsReader::new(BufReader::new(file))
        .read()
        .with_context(|| format!("GDS parse error in {}", path.display()))
}

fn log_extent(extent: &BBox, meters_per_db: f64) {
    let um_per_db = meters_per_db * 1e6;
    let width = extent.width() as f64 * um_per_db;
    let height = extent.height() as f64 * um_per_db;
    log::info!("PhysicalSize {:.3} x {:.3} µm", width, height);
    let largest = width.max(height);
    if largest > 0.0 {
        let scale = 1.0 / largest;
        log::info!("ScalingFactor {:.3e}", scale);
        log::info!("ModelSize {:.3} x {:.3}", width * scale, height * scale);
    }
}

/// Read the layout, build every layer of `stack` and return their records.
pub fn build_records(library: &GdsLibrary, stack: &mut LayerStack) -> Result<Vec<LayerRecord>> {
    let top = library
        .top_cell()
        .ok_or_else(|| anyhow!("Library '{}' has no top cell", library.name))?;
    log::info!("Top {}", top.name);

    let mut layout = library.flatten(top)?;
    for layer in stack.layers_mut() {
        let count = layer.add_polygons(layout.take(layer.key()));
        log::debug!("Layer {} ({}): {} polygons", layer.key(), layer.config.name, count);
    }
    for key in layout.keys() {
        log::debug!("Ignoring {} polygons on unmapped layer {}", layout.polygons(key).len(), key);
    }

    if let Some(extent) = layout.bbox() {
        stack.set_extent(extent);
        log_extent(&extent, library.meters_per_db);
    }

    assemble_stack(stack, &Engines::default()).map_err(|e| {
        log::error!("Layer {} failed", e.key());
        anyhow::Error::new(e)
    })
}

/// Convert `conversion.input` into a data script or a full page.
pub fn convert(conversion: &Conversion) -> Result<()> {
    let assets = if conversion.writes_page() {
        Some(PageAssets {
            template: read_asset(&conversion.assets_dir, "index.html")?,
            bundle: read_asset(&conversion.assets_dir, "bundle.js")?,
        })
    } else {
        None
    };

    let library = load_library(&conversion.input)?;
    let mut stack = LayerStack::sky130();
    let records = build_records(&library, &mut stack)?;

    let output = &conversion.output;
    let file = File::create(output).with_context(|| format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    let written = match assets {
        Some(assets) => {
            let input_name = conversion.input.display().to_string();
            write_page(&mut writer, &assets.template, &assets.bundle, &input_name, &records)
        }
        None => write_data(&mut writer, &records).and_then(|()| writer.flush()),
    };
    written.with_context(|| format!("Failed to write {}", output.display()))?;

    log::info!("Wrote {} layers to {}", records.len(), output.display());
    Ok(())
}
