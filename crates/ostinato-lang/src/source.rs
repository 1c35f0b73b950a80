//! Parsed source data model.

use std::path::PathBuf;

use crate::fs::FileIdentity;

pub const MAX_SLIDERS: usize = 256;
pub const MAX_CHANNELS: usize = 64;

/// One of the six named section kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Init,
    Slider,
    Block,
    Sample,
    Serialize,
    Gfx,
}

/// A section body plus the 0-based index of its first line in the file,
/// for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    pub line_offset: u32,
    pub text: String,
}

/// Result of the first parsing pass: header plus optional sections.
#[derive(Debug, Clone, Default)]
pub struct Toplevel {
    pub header: Section,
    pub init: Option<Section>,
    pub slider: Option<Section>,
    pub block: Option<Section>,
    pub sample: Option<Section>,
    pub serialize: Option<Section>,
    pub gfx: Option<Section>,
    pub gfx_w: u32,
    pub gfx_h: u32,
}

impl Toplevel {
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        match kind {
            SectionKind::Init => self.init.as_ref(),
            SectionKind::Slider => self.slider.as_ref(),
            SectionKind::Block => self.block.as_ref(),
            SectionKind::Sample => self.sample.as_ref(),
            SectionKind::Serialize => self.serialize.as_ref(),
            SectionKind::Gfx => self.gfx.as_ref(),
        }
    }
}

/// Curve shape of a slider declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SliderShape {
    #[default]
    Linear,
    Log,
    Sqr,
}

/// One `sliderN:` declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliderDecl {
    /// 0-based slider index.
    pub id: u32,
    /// Variable bound in the VM; defaults to `sliderN`.
    pub var: String,
    pub def: f64,
    pub min: f64,
    pub max: f64,
    pub inc: f64,
    pub shape: SliderShape,
    pub shape_modifier: f64,
    pub is_enum: bool,
    pub enum_names: Vec<String>,
    /// Enum backed by files under this data sub-directory.
    pub path: String,
    pub desc: String,
    pub initially_visible: bool,
    pub exists: bool,
}

/// One `config:` item: a load-time choice fed to the preprocessor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigItem {
    pub identifier: String,
    pub name: String,
    pub default_value: f64,
    pub var_names: Vec<String>,
    pub var_values: Vec<f64>,
}

/// `options:` directive values.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderOptions {
    pub gmem: String,
    /// Requested memory slot bound; 0 selects the VM default.
    pub maxmem: u32,
    /// Slots to pre-allocate; negative means all of `maxmem`.
    pub prealloc: i64,
    pub want_all_kb: bool,
    pub no_meter: bool,
    /// Requested gfx refresh rate; 0 means unset.
    pub gfx_hz: u32,
}

impl Default for HeaderOptions {
    fn default() -> Self {
        HeaderOptions {
            gmem: String::new(),
            maxmem: 0,
            prealloc: 0,
            want_all_kb: false,
            no_meter: false,
            gfx_hz: 0,
        }
    }
}

/// Parsed header metadata.
#[derive(Debug, Clone, Default)]
pub struct Header {
    pub desc: String,
    pub author: String,
    pub tags: Vec<String>,
    pub explicit_pins: bool,
    pub in_pins: Vec<String>,
    pub out_pins: Vec<String>,
    pub sliders: Vec<SliderDecl>,
    pub filenames: Vec<String>,
    pub imports: Vec<String>,
    pub config_items: Vec<ConfigItem>,
    pub options: HeaderOptions,
}

impl Header {
    pub fn slider(&self, index: u32) -> Option<&SliderDecl> {
        self.sliders.iter().find(|s| s.id == index && s.exists)
    }
}

/// One fully parsed file.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub identity: FileIdentity,
    /// The preprocessed source text the sections were split from.
    pub text: String,
    pub toplevel: Toplevel,
    pub header: Header,
}
