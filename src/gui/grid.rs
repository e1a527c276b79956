use std::collections::HashMap;

use base64::Engine as _;
use egui::{Context, TextureHandle, Ui};

use crate::core::slots::{Slot, SlotGrid, SlotState};
use crate::identify::fragment::{Element, Node};

pub const GRID_COLUMNS: usize = 5;

const TILE_IMAGE_MAX_HEIGHT: f32 = 130.0;

/// Renders the 10-tile results grid. Textures are rebuilt only when a tile's
/// revision changes, so repainting the grid costs nothing while idle.
pub struct GridView {
    textures: HashMap<u8, TileTexture>,
}

struct TileTexture {
    revision: u64,
    handle: Option<TextureHandle>,
}

impl GridView {
    pub fn new() -> Self {
        Self {
            textures: HashMap::new(),
        }
    }

    pub fn show(&mut self, ui: &mut Ui, grid: &SlotGrid) {
        let spacing = ui.spacing().item_spacing.x;
        let tile_width = ((ui.available_width() - spacing * (GRID_COLUMNS as f32 - 1.0))
            / GRID_COLUMNS as f32)
            .max(120.0);

        egui::Grid::new("card_grid")
            .num_columns(GRID_COLUMNS)
            .min_col_width(tile_width)
            .show(ui, |ui| {
                for (index, slot) in grid.iter().enumerate() {
                    self.tile(ui, slot, tile_width);
                    if (index + 1) % GRID_COLUMNS == 0 {
                        ui.end_row();
                    }
                }
            });
    }

    fn tile(&mut self, ui: &mut Ui, slot: &Slot, width: f32) {
        let texture = self.texture_for(ui.ctx(), slot);

        ui.group(|ui| {
            ui.set_width(width);
            ui.set_min_height(width * 0.85);
            ui.vertical_centered(|ui| match &slot.state {
                SlotState::Empty => {
                    ui.add_space(width * 0.35);
                    ui.weak(format!("Empty slot {}", slot.id.number()));
                }
                SlotState::Uploading { .. } => {
                    if let Some(texture) = &texture {
                        show_texture(ui, texture, width - 12.0);
                    }
                    ui.strong("Identifying…");
                    ui.label("Please hold");
                    ui.weak("Uploading frame");
                }
                SlotState::Failed { .. } => {
                    if let Some(texture) = &texture {
                        show_texture(ui, texture, width - 12.0);
                    }
                    ui.colored_label(ui.visuals().error_fg_color, "Identification failed");
                }
                SlotState::Filled { fragment } => {
                    if let Some(texture) = &texture {
                        show_texture(ui, texture, width - 12.0);
                    }
                    for (index, line) in fragment_lines(fragment).iter().enumerate() {
                        if index == 0 {
                            ui.strong(line);
                        } else {
                            ui.label(line);
                        }
                    }
                    if let Some(timestamp) = timestamp_line(fragment) {
                        ui.weak(timestamp);
                    }
                }
            });
        });
    }

    fn texture_for(&mut self, ctx: &Context, slot: &Slot) -> Option<TextureHandle> {
        let number = slot.id.number();
        if let Some(entry) = self.textures.get(&number) {
            if entry.revision == slot.revision {
                return entry.handle.clone();
            }
        }

        let handle = build_texture(ctx, slot);
        let result = handle.clone();
        self.textures.insert(
            number,
            TileTexture {
                revision: slot.revision,
                handle,
            },
        );
        result
    }
}

impl Default for GridView {
    fn default() -> Self {
        Self::new()
    }
}

fn show_texture(ui: &mut Ui, texture: &TextureHandle, max_width: f32) {
    let size = texture.size_vec2();
    if size.x <= 0.0 || size.y <= 0.0 {
        return;
    }
    let scale = (max_width / size.x)
        .min(TILE_IMAGE_MAX_HEIGHT / size.y)
        .min(1.0);
    ui.add(egui::Image::new((texture.id(), size * scale)));
}

fn build_texture(ctx: &Context, slot: &Slot) -> Option<TextureHandle> {
    match &slot.state {
        SlotState::Empty => None,
        SlotState::Uploading { .. } | SlotState::Failed { .. } => {
            let preview = slot.state.preview()?;
            upload_rgba(
                ctx,
                &format!("tile_{}_preview", slot.id.number()),
                &preview.rgba,
                preview.width,
                preview.height,
            )
        }
        SlotState::Filled { fragment } => {
            let source = thumbnail_source(fragment)?;
            match decode_data_url(source) {
                Some((rgba, width, height)) => upload_rgba(
                    ctx,
                    &format!("tile_{}_thumb", slot.id.number()),
                    &rgba,
                    width,
                    height,
                ),
                None => {
                    log::warn!("Tile {} has an undecodable thumbnail", slot.id);
                    None
                }
            }
        }
    }
}

fn upload_rgba(
    ctx: &Context,
    name: &str,
    rgba: &[u8],
    width: u32,
    height: u32,
) -> Option<TextureHandle> {
    if rgba.len() != (width as usize) * (height as usize) * 4 {
        log::warn!("Skipping texture {} with bad buffer size", name);
        return None;
    }
    let color_image =
        egui::ColorImage::from_rgba_unmultiplied([width as usize, height as usize], rgba);
    Some(ctx.load_texture(name, color_image, egui::TextureOptions::LINEAR))
}

/// The fragment's thumbnail: the first img element, the root included.
fn thumbnail_source(root: &Element) -> Option<&str> {
    if root.name == "img" {
        return root.attr("src");
    }
    root.find("img")?.attr("src")
}

/// Decodes a `data:image/...;base64,` URL into RGBA pixels.
fn decode_data_url(src: &str) -> Option<(Vec<u8>, u32, u32)> {
    let rest = src.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    if !meta.ends_with(";base64") {
        return None;
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .ok()?;
    let decoded = image::load_from_memory(&bytes).ok()?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    Some((rgba.into_raw(), width, height))
}

/// Text lines of a fragment in document order. Each element contributes its
/// direct text as one line, so the endpoint's name/set/number/confidence
/// rows come out as separate labels.
fn fragment_lines(root: &Element) -> Vec<String> {
    let mut lines = Vec::new();
    collect_lines(root, &mut lines);
    lines
}

fn collect_lines(element: &Element, lines: &mut Vec<String>) {
    let mut direct: Vec<&str> = Vec::new();
    for node in &element.children {
        if let Node::Text(text) = node {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                direct.push(trimmed);
            }
        }
    }
    if !direct.is_empty() {
        lines.push(direct.join(" "));
    }
    for child in element.child_elements() {
        collect_lines(child, lines);
    }
}

/// Renders the fragment's `data-ts` unix timestamp as local time.
fn timestamp_line(root: &Element) -> Option<String> {
    let raw = root
        .attr("data-ts")
        .or_else(|| root.descendants().find_map(|element| element.attr("data-ts")))?;
    let seconds = raw.trim().parse::<i64>().ok()?;
    let time = chrono::DateTime::from_timestamp(seconds, 0)?;
    Some(
        time.with_timezone(&chrono::Local)
            .format("Captured %Y-%m-%d %H:%M:%S")
            .to_string(),
    )
}
