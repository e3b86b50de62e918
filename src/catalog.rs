//! Selectable backgrounds and filters.

use crate::error::{BoothError, BoothResult};
use crate::filter::FilterTransform;
use image::{Rgb, RgbImage};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What a background layer paints.
#[derive(Clone, Debug, PartialEq)]
pub enum Fill {
    Color(Rgb<u8>),
    Image(Arc<RgbImage>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BackgroundLayer {
    pub id: String,
    pub display_name: String,
    pub fill: Fill,
}

impl BackgroundLayer {
    pub fn color(id: &str, display_name: &str, color: Rgb<u8>) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            fill: Fill::Color(color),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilterSpec {
    pub id: String,
    pub display_name: String,
    pub transform: FilterTransform,
}

impl FilterSpec {
    pub fn new(id: &str, display_name: &str, transform: FilterTransform) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            transform,
        }
    }
}

/// Ordered, non-empty list of backgrounds, selected by index.
#[derive(Clone, Debug)]
pub struct BackgroundCatalog {
    layers: Vec<BackgroundLayer>,
}

impl BackgroundCatalog {
    pub fn new(layers: Vec<BackgroundLayer>) -> BoothResult<Self> {
        if layers.is_empty() {
            return Err(BoothError::catalog("at least one background is required"));
        }
        ensure_unique(layers.iter().map(|l| l.id.as_str()), "background")?;
        Ok(Self { layers })
    }

    pub fn builtin() -> Self {
        const BUILTIN: [(&str, &str, &str); 10] = [
            ("bg-vip-room", "VIP Room", "#2c3e50"),
            ("bg-beach", "Beach", "#3498db"),
            ("bg-paris", "Paris", "#e74c3c"),
            ("bg-sakura-road", "Sakura Road", "#fd79a8"),
            ("bg-snow-mountain", "Snow Mountain", "#dfe6e9"),
            ("bg-studio", "Studio", "#636e72"),
            ("bg-cafe", "Cafe", "#d63031"),
            ("bg-street", "Street", "#f1c40f"),
            ("bg-night", "Night View", "#2d3436"),
            ("bg-neon", "Neon", "#0984e3"),
        ];

        let layers = BUILTIN
            .iter()
            .filter_map(|(id, name, hex)| {
                parse_hex_color(hex).map(|c| BackgroundLayer::color(id, name, c))
            })
            .collect();
        Self { layers }
    }

    /// The first background; the session starts with it selected
    pub fn default_layer(&self) -> &BackgroundLayer {
        &self.layers[0]
    }

    pub fn get(&self, index: usize) -> Option<&BackgroundLayer> {
        self.layers.get(index)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackgroundLayer> {
        self.layers.iter()
    }
}

/// Ordered, non-empty list of filters, selected by id.
#[derive(Clone, Debug)]
pub struct FilterCatalog {
    filters: Vec<FilterSpec>,
}

impl FilterCatalog {
    pub fn new(filters: Vec<FilterSpec>) -> BoothResult<Self> {
        if filters.is_empty() {
            return Err(BoothError::catalog("at least one filter is required"));
        }
        ensure_unique(filters.iter().map(|f| f.id.as_str()), "filter")?;
        Ok(Self { filters })
    }

    pub fn builtin() -> Self {
        use FilterTransform::*;
        let filters = vec![
            FilterSpec::new("filter-none", "Original", None),
            FilterSpec::new("filter-punch", "Boutique", Punch),
            FilterSpec::new("filter-cool", "Japanese", Cool),
            FilterSpec::new("filter-sakura", "Sakura Pink", Sakura),
            FilterSpec::new("filter-dark", "Dark", Dark),
            FilterSpec::new("filter-vintage", "Retro", Vintage),
            FilterSpec::new("filter-sepia", "Nostalgia", Sepia),
            FilterSpec::new("filter-warm", "Warm Sun", Warm),
            FilterSpec::new("filter-cyber", "Cyber", Cyber),
            FilterSpec::new("filter-soft", "Soft Focus", Soft),
            FilterSpec::new("filter-fade", "Faded", Fade),
            FilterSpec::new("filter-grayscale", "B&W", Grayscale),
        ];
        Self { filters }
    }

    pub fn get(&self, id: &str) -> Option<&FilterSpec> {
        self.filters.iter().find(|f| f.id == id)
    }

    /// The first filter; the session starts with it selected
    pub fn default_filter(&self) -> &FilterSpec {
        &self.filters[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterSpec> {
        self.filters.iter()
    }
}

fn ensure_unique<'a>(ids: impl Iterator<Item = &'a str>, kind: &str) -> BoothResult<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(BoothError::catalog(format!("duplicate {kind} id '{id}'")));
        }
    }
    Ok(())
}

/// Parse `#rrggbb` (the leading `#` is optional).
pub fn parse_hex_color(hex: &str) -> Option<Rgb<u8>> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    backgrounds: Option<Vec<BackgroundEntry>>,
    filters: Option<Vec<FilterEntry>>,
}

#[derive(Deserialize)]
struct BackgroundEntry {
    id: String,
    name: String,
    #[serde(flatten)]
    fill: FillEntry,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum FillEntry {
    Color(String),
    Image(PathBuf),
}

#[derive(Deserialize)]
struct FilterEntry {
    id: String,
    name: String,
    preset: FilterTransform,
}

/// Load catalogs from a JSON file.
///
/// A section left out of the file falls back to the built-in list; an empty
/// one is an error. Image
/// paths are resolved relative to the file and decoded up front.
pub fn load_catalogs(path: &Path) -> BoothResult<(BackgroundCatalog, FilterCatalog)> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| BoothError::catalog(format!("{}: {e}", path.display())))?;
    let file: CatalogFile = serde_json::from_str(&text)
        .map_err(|e| BoothError::catalog(format!("{}: {e}", path.display())))?;
    let base = path.parent().unwrap_or(Path::new("."));

    let backgrounds = match file.backgrounds {
        None => BackgroundCatalog::builtin(),
        Some(entries) => {
            let layers = entries
                .into_iter()
                .map(|entry| -> BoothResult<BackgroundLayer> {
                    let fill = match entry.fill {
                        FillEntry::Color(hex) => Fill::Color(parse_hex_color(&hex).ok_or_else(
                            || BoothError::catalog(format!("bad color '{hex}' for '{}'", entry.id)),
                        )?),
                        FillEntry::Image(rel) => {
                            let full = base.join(rel);
                            tracing::debug!("Loading background image {}", full.display());
                            let image = image::open(&full).map_err(|e| {
                                BoothError::catalog(format!("{}: {e}", full.display()))
                            })?;
                            Fill::Image(Arc::new(image.to_rgb8()))
                        }
                    };
                    Ok(BackgroundLayer {
                        id: entry.id,
                        display_name: entry.name,
                        fill,
                    })
                })
                .collect::<BoothResult<Vec<_>>>()?;
            BackgroundCatalog::new(layers)?
        }
    };

    let filters = match file.filters {
        None => FilterCatalog::builtin(),
        Some(entries) => FilterCatalog::new(
            entries
                .into_iter()
                .map(|f| FilterSpec {
                    id: f.id,
                    display_name: f.name,
                    transform: f.preset,
                })
                .collect(),
        )?,
    };

    tracing::info!(
        "Loaded catalog {}: {} backgrounds, {} filters",
        path.display(),
        backgrounds.len(),
        filters.iter().count()
    );
    Ok((backgrounds, filters))
}
