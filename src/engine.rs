use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use crate::assets::decode::{decode_image, unpremultiply_rgba8_in_place};
use crate::assets::{AssetFetcher, PreparedImage};
use crate::core::{Canvas, LayerId, Point, Rgba8Premul, Vec2};
use crate::error::{DeepfryError, DeepfryResult};
use crate::layer::{HandleKind, Layer, clamp_scale};
use crate::surface::Surface;

/// Fraction of the canvas a freshly installed layer is fitted to.
pub const DEFAULT_FIT_SCALE: f64 = 0.8;

/// Rim inset of the circular mask, in pixels.
const MASK_MARGIN_PX: f64 = 2.0;

/// Sort rank for categories absent from the configured layer order.
const UNRANKED: usize = 9999;

const HANDLE_STROKE: Rgba8Premul = Rgba8Premul {
    r: 255,
    g: 153,
    b: 51,
    a: 255,
};
const HANDLE_FILL: Rgba8Premul = Rgba8Premul::WHITE;

/// Whole-frame pixel transform run after compositing, before the handle
/// overlay. Receives the premultiplied RGBA8 buffer and its dimensions.
pub type PostProcess = Box<dyn FnMut(&mut [u8], u32, u32) -> DeepfryResult<()>>;

/// What happened to the installed post-process during a render.
///
/// A failing hook skips that frame's effect but never fails the frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PostProcessOutcome {
    NotInstalled,
    Applied,
    Skipped(String),
}

/// Per-render result handed back from [`Engine::tick`] / [`Engine::render`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderReport {
    pub post_process: PostProcessOutcome,
}

/// Engine construction parameters. No ambient globals; every collaborator
/// receives the built engine explicitly.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub canvas: Canvas,
    /// Base clear color, also used outside the circular mask.
    pub background: Rgba8Premul,
    /// Canonical category stacking order, bottom to top. When set, layers are
    /// kept sorted by category rank (ties by creation id) after every
    /// mutation.
    pub layer_order: Option<Vec<String>>,
    /// Enables the pointer-driven move/scale/rotate state machine.
    pub transforms_enabled: bool,
    /// Fit factor applied when auto-scaling a new layer to the canvas.
    pub fit_scale_factor: f64,
}

impl EngineConfig {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            canvas,
            background: Rgba8Premul::WHITE,
            layer_order: None,
            transforms_enabled: true,
            fit_scale_factor: DEFAULT_FIT_SCALE,
        }
    }
}

struct PendingDecode {
    category: String,
    source: String,
    name: String,
    token: u64,
}

#[derive(Clone, Copy, Debug)]
enum DragState {
    Move {
        layer: LayerId,
        grab_offset: Vec2,
    },
    Scale {
        layer: LayerId,
        start_dist: f64,
        start_scale: f64,
    },
    Rotate {
        layer: LayerId,
        start_angle: f64,
        start_rotation: f64,
    },
}

impl DragState {
    fn layer(&self) -> LayerId {
        match *self {
            DragState::Move { layer, .. }
            | DragState::Scale { layer, .. }
            | DragState::Rotate { layer, .. } => layer,
        }
    }
}

/// The compositing engine: an ordered layer list rendered into an off-screen
/// buffer, with pointer-driven transform edits and a post-process hook.
pub struct Engine {
    canvas: Canvas,
    background: Rgba8Premul,
    rank: Option<HashMap<String, usize>>,
    transforms_enabled: bool,
    fit_scale_factor: f64,

    layers: Vec<Layer>,
    selected: Option<usize>,
    active_sources: HashMap<String, String>,
    next_id: u64,

    pending: VecDeque<PendingDecode>,
    tokens: HashMap<String, u64>,
    next_token: u64,

    drag: Option<DragState>,
    needs_render: bool,

    post_process: Option<PostProcess>,
    mask_circle: bool,
    transparent_background: bool,

    buffer: Surface,
    frame: Surface,
}

impl Engine {
    pub fn new(config: EngineConfig) -> DeepfryResult<Self> {
        let canvas = Canvas::new(config.canvas.width, config.canvas.height)?;
        if !config.fit_scale_factor.is_finite() || config.fit_scale_factor <= 0.0 {
            return Err(DeepfryError::validation("fit_scale_factor must be > 0"));
        }

        let rank = config.layer_order.as_ref().map(|order| {
            order
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect::<HashMap<_, _>>()
        });

        Ok(Self {
            canvas,
            background: config.background,
            rank,
            transforms_enabled: config.transforms_enabled,
            fit_scale_factor: config.fit_scale_factor,
            layers: Vec::new(),
            selected: None,
            active_sources: HashMap::new(),
            next_id: 1,
            pending: VecDeque::new(),
            tokens: HashMap::new(),
            next_token: 0,
            drag: None,
            needs_render: true,
            post_process: None,
            mask_circle: false,
            transparent_background: false,
            buffer: Surface::new(canvas)?,
            frame: Surface::new(canvas)?,
        })
    }

    // --- read-only queries for external view layers ---

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_layer(&self) -> Option<&Layer> {
        self.selected.and_then(|i| self.layers.get(i))
    }

    /// Currently active source reference for a category, for UI highlighting.
    pub fn active_source(&self, category: &str) -> Option<&str> {
        self.active_sources.get(category).map(String::as_str)
    }

    pub fn pending_decodes(&self) -> usize {
        self.pending.len()
    }

    /// Latest composited frame, including the handle overlay.
    pub fn frame(&self) -> &Surface {
        &self.frame
    }

    // --- scene mutation ---

    /// Mark the scene dirty; the next [`Engine::tick`] re-renders.
    pub fn request_render(&mut self) {
        self.needs_render = true;
    }

    pub fn set_transforms_enabled(&mut self, enabled: bool) {
        self.transforms_enabled = enabled;
        if !enabled {
            self.drag = None;
        }
        self.request_render();
    }

    pub fn set_mask_circle(&mut self, enabled: bool) {
        self.mask_circle = enabled;
        self.request_render();
    }

    pub fn set_transparent_background(&mut self, enabled: bool) {
        self.transparent_background = enabled;
        self.request_render();
    }

    pub fn set_post_process(&mut self, hook: Option<PostProcess>) {
        self.post_process = hook;
        self.request_render();
    }

    /// Queue an asset decode for `category`. The request completes later via
    /// [`Engine::pump_assets`] (or [`Engine::apply_decoded`] directly); the
    /// returned token identifies the request and supersedes any in-flight
    /// decode for the same category.
    pub fn set_category_asset(
        &mut self,
        category: &str,
        source: &str,
        name: &str,
    ) -> DeepfryResult<u64> {
        if category.is_empty() || source.is_empty() {
            return Err(DeepfryError::validation(
                "category and source must be non-empty",
            ));
        }
        let token = self.bump_token(category);
        self.pending.push_back(PendingDecode {
            category: category.to_string(),
            source: source.to_string(),
            name: if name.is_empty() { source } else { name }.to_string(),
            token,
        });
        Ok(token)
    }

    /// Drain queued decode requests through `fetcher`. Fetch or decode
    /// failures are logged and skipped without touching the scene. Returns
    /// how many layers were installed.
    pub fn pump_assets(&mut self, fetcher: &mut dyn AssetFetcher) -> usize {
        let mut applied = 0;
        while let Some(req) = self.pending.pop_front() {
            if self.tokens.get(&req.category) != Some(&req.token) {
                tracing::debug!(category = %req.category, "dropping superseded decode request");
                continue;
            }
            let decoded = fetcher
                .fetch(&req.source)
                .and_then(|bytes| decode_image(&bytes));
            let image = match decoded {
                Ok(image) => image,
                Err(err) => {
                    tracing::warn!(source = %req.source, %err, "asset decode failed, layer unchanged");
                    continue;
                }
            };
            if self.apply_decoded(&req.category, Some(&req.source), &req.name, image, req.token) {
                applied += 1;
            }
        }
        applied
    }

    /// Deliver a completed decode. Returns `false` when the completion is
    /// stale (its token was superseded, or its category was deleted or the
    /// scene cleared in the meantime), in which case the scene is untouched.
    pub fn apply_decoded(
        &mut self,
        category: &str,
        source: Option<&str>,
        name: &str,
        image: PreparedImage,
        token: u64,
    ) -> bool {
        if self.tokens.get(category) != Some(&token) {
            tracing::debug!(category, token, "dropping stale decode completion");
            return false;
        }
        self.upsert_layer(category, Arc::new(image), source.map(str::to_string), name);
        true
    }

    /// Install an already-decoded bitmap for `category` (the upload path).
    /// Upsert semantics match the decode path; any in-flight decode for the
    /// category becomes stale.
    pub fn set_image_layer(
        &mut self,
        category: &str,
        image: PreparedImage,
        name: &str,
    ) -> DeepfryResult<LayerId> {
        if category.is_empty() {
            return Err(DeepfryError::validation("category must be non-empty"));
        }
        self.bump_token(category);
        Ok(self.upsert_layer(category, Arc::new(image), None, name))
    }

    /// Append a locked overlay layer (e.g. a watermark). Locked layers never
    /// participate in category upsert, always render on top, and refuse
    /// delete and reorder.
    pub fn add_locked_layer(&mut self, image: PreparedImage, name: &str) -> LayerId {
        let layer = self.build_layer("watermark", Arc::new(image), None, name, true);
        let id = layer.id;
        self.layers.push(layer);
        self.sort_layers_if_needed();
        self.request_render();
        id
    }

    pub fn delete_selected(&mut self) {
        let Some(i) = self.selected else { return };
        if self.layers.get(i).is_none_or(|l| l.locked) {
            return;
        }
        let removed = self.layers.remove(i);
        // A late decode must not resurrect the category.
        self.tokens.remove(&removed.category);
        self.selected = self.layers.len().checked_sub(1);
        self.request_render();
    }

    pub fn move_selected_up(&mut self) {
        let Some(i) = self.selected else { return };
        if i + 1 >= self.layers.len() {
            return;
        }
        if self.layers[i].locked || self.layers[i + 1].locked {
            return;
        }
        self.layers.swap(i, i + 1);
        self.selected = Some(i + 1);
        self.sort_layers_if_needed();
        self.request_render();
    }

    pub fn move_selected_down(&mut self) {
        let Some(i) = self.selected else { return };
        if i == 0 || i >= self.layers.len() {
            return;
        }
        if self.layers[i].locked || self.layers[i - 1].locked {
            return;
        }
        self.layers.swap(i, i - 1);
        self.selected = Some(i - 1);
        self.sort_layers_if_needed();
        self.request_render();
    }

    pub fn clear_layers(&mut self) {
        self.layers.clear();
        self.selected = None;
        self.active_sources.clear();
        self.pending.clear();
        self.tokens.clear();
        self.request_render();
    }

    pub fn select_layer(&mut self, index: Option<usize>) -> DeepfryResult<()> {
        if let Some(i) = index
            && i >= self.layers.len()
        {
            return Err(DeepfryError::validation("selection index out of range"));
        }
        self.selected = index;
        self.request_render();
        Ok(())
    }

    fn bump_token(&mut self, category: &str) -> u64 {
        self.next_token += 1;
        self.tokens.insert(category.to_string(), self.next_token);
        self.next_token
    }

    fn build_layer(
        &mut self,
        category: &str,
        image: Arc<PreparedImage>,
        source: Option<String>,
        name: &str,
        locked: bool,
    ) -> Layer {
        let (iw, ih) = (f64::from(image.width), f64::from(image.height));
        let fit = if iw > 0.0 && ih > 0.0 {
            (f64::from(self.canvas.width) / iw).min(f64::from(self.canvas.height) / ih)
        } else {
            1.0
        };
        let id = LayerId(self.next_id);
        self.next_id += 1;
        Layer {
            id,
            category: category.to_string(),
            name: name.to_string(),
            source,
            image,
            x: f64::from(self.canvas.width) / 2.0,
            y: f64::from(self.canvas.height) / 2.0,
            scale: clamp_scale(fit * self.fit_scale_factor),
            rotation: 0.0,
            opacity: 1.0,
            locked,
            width: iw,
            height: ih,
        }
    }

    fn upsert_layer(
        &mut self,
        category: &str,
        image: Arc<PreparedImage>,
        source: Option<String>,
        name: &str,
    ) -> LayerId {
        let layer = self.build_layer(category, image, source.clone(), name, false);
        let id = layer.id;

        let existing = self
            .layers
            .iter()
            .position(|l| !l.locked && l.category == category);
        match existing {
            Some(i) => {
                self.layers[i] = layer;
                self.selected = Some(i);
            }
            None => {
                self.layers.push(layer);
                self.selected = Some(self.layers.len() - 1);
            }
        }

        self.sort_layers_if_needed();

        if let Some(src) = source {
            self.active_sources.insert(category.to_string(), src);
        }
        self.request_render();
        id
    }

    /// Keep layers sorted by configured category rank (ties by creation id).
    /// Selection survives by id.
    fn sort_layers_if_needed(&mut self) {
        let Some(rank) = &self.rank else { return };
        if self.layers.len() < 2 {
            return;
        }
        let selected_id = self.selected.and_then(|i| self.layers.get(i)).map(|l| l.id);

        self.layers.sort_by_key(|l| {
            (
                rank.get(&l.category).copied().unwrap_or(UNRANKED),
                l.id,
            )
        });

        if let Some(id) = selected_id {
            self.selected = self.layers.iter().position(|l| l.id == id);
        }
    }

    // --- pointer-driven transform state machine ---

    /// Pointer press in canvas coordinates.
    ///
    /// With transforms enabled: handles of the selected layer win over its
    /// body; a body hit on another unlocked layer selects it and immediately
    /// starts a move; empty space deselects. A drag already in progress is
    /// never interrupted. With transforms disabled this is a plain topmost-
    /// first selection click.
    pub fn pointer_down(&mut self, p: Point) {
        if self.drag.is_some() {
            return;
        }

        if !self.transforms_enabled {
            for i in (0..self.layers.len()).rev() {
                if self.layers[i].hit_body(p) {
                    self.selected = Some(i);
                    self.request_render();
                    return;
                }
            }
            self.selected = None;
            self.request_render();
            return;
        }

        if let Some(grab) = self.grab_on_selected(p) {
            self.drag = Some(grab);
            return;
        }

        for i in (0..self.layers.len()).rev() {
            let layer = &self.layers[i];
            if layer.locked {
                continue;
            }
            if layer.hit_body(p) {
                self.drag = Some(DragState::Move {
                    layer: layer.id,
                    grab_offset: layer.center() - p,
                });
                self.selected = Some(i);
                self.request_render();
                return;
            }
        }

        self.selected = None;
        self.request_render();
    }

    /// Handle or body grab on the currently selected layer, if any.
    fn grab_on_selected(&self, p: Point) -> Option<DragState> {
        let sel = self.selected_layer()?;
        if sel.locked {
            return None;
        }
        if let Some(handle) = sel.hit_handle(p) {
            return Some(match handle {
                HandleKind::Rotate => DragState::Rotate {
                    layer: sel.id,
                    start_angle: (p.y - sel.y).atan2(p.x - sel.x),
                    start_rotation: sel.rotation,
                },
                HandleKind::Scale => DragState::Scale {
                    layer: sel.id,
                    start_dist: (p - sel.center()).hypot(),
                    start_scale: sel.scale,
                },
            });
        }
        if sel.hit_body(p) {
            return Some(DragState::Move {
                layer: sel.id,
                grab_offset: sel.center() - p,
            });
        }
        None
    }

    /// Pointer motion in canvas coordinates; only meaningful mid-drag.
    pub fn pointer_move(&mut self, p: Point) {
        if !self.transforms_enabled {
            return;
        }
        let Some(drag) = self.drag else { return };

        let Some(index) = self.layers.iter().position(|l| l.id == drag.layer()) else {
            // The dragged layer left the scene (e.g. replaced by an upsert).
            self.drag = None;
            return;
        };
        let layer = &mut self.layers[index];

        match drag {
            DragState::Move { grab_offset, .. } => {
                layer.x = p.x + grab_offset.x;
                layer.y = p.y + grab_offset.y;
            }
            DragState::Rotate {
                start_angle,
                start_rotation,
                ..
            } => {
                let angle = (p.y - layer.y).atan2(p.x - layer.x);
                layer.rotation = start_rotation + (angle - start_angle);
            }
            DragState::Scale {
                start_dist,
                start_scale,
                ..
            } => {
                let dist = (p - layer.center()).hypot();
                let ratio = if start_dist > 1.0 {
                    dist / start_dist
                } else {
                    1.0
                };
                layer.scale = clamp_scale(start_scale * ratio);
            }
        }
        self.request_render();
    }

    /// Pointer release, tracked globally: ends any drag wherever it happens.
    pub fn pointer_up(&mut self) {
        if self.drag.take().is_some() {
            self.request_render();
        }
    }

    // --- rendering ---

    /// Scheduler tick: renders once if the scene is dirty.
    pub fn tick(&mut self) -> Option<RenderReport> {
        if !self.needs_render {
            return None;
        }
        self.needs_render = false;
        Some(self.render_frame(false))
    }

    /// Force a render regardless of the dirty flag.
    pub fn render(&mut self) -> RenderReport {
        self.needs_render = false;
        self.render_frame(false)
    }

    #[tracing::instrument(skip(self))]
    fn render_frame(&mut self, suppress_handles: bool) -> RenderReport {
        if self.transparent_background {
            self.buffer.clear_transparent();
        } else {
            self.buffer.fill(self.background);
        }

        // Unlocked layers in z-order, then locked layers above everything.
        for layer in self.layers.iter().filter(|l| !l.locked) {
            self.buffer.draw_image(
                &layer.image,
                layer.center(),
                layer.scale,
                layer.rotation,
                layer.opacity,
            );
        }
        for layer in self.layers.iter().filter(|l| l.locked) {
            self.buffer.draw_image(
                &layer.image,
                layer.center(),
                layer.scale,
                layer.rotation,
                layer.opacity,
            );
        }

        if self.mask_circle {
            self.buffer.mask_circle(self.background, MASK_MARGIN_PX);
        }

        let post_process = match &mut self.post_process {
            None => PostProcessOutcome::NotInstalled,
            Some(hook) => {
                let Canvas { width, height } = self.canvas;
                match hook(self.buffer.data_mut(), width, height) {
                    Ok(()) => PostProcessOutcome::Applied,
                    Err(err) => {
                        tracing::warn!(%err, "post-process failed, frame composited without it");
                        PostProcessOutcome::Skipped(err.to_string())
                    }
                }
            }
        };

        self.frame.copy_from(&self.buffer);

        if !suppress_handles
            && self.transforms_enabled
            && let Some(i) = self.selected
            && let Some(layer) = self.layers.get(i)
        {
            draw_handles(&mut self.frame, layer);
        }

        RenderReport { post_process }
    }

    /// Render with handles suppressed and encode the frame as PNG bytes.
    ///
    /// Failure is recoverable: the engine is left dirty so the next tick
    /// re-renders normally, and no state is corrupted.
    pub fn export_png(&mut self) -> DeepfryResult<Vec<u8>> {
        let _ = self.render_frame(true);
        self.request_render();

        let mut rgba = self.frame.data().to_vec();
        unpremultiply_rgba8_in_place(&mut rgba);

        let img = image::RgbaImage::from_raw(self.canvas.width, self.canvas.height, rgba)
            .ok_or_else(|| DeepfryError::export("frame buffer does not match canvas size"))?;
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|e| DeepfryError::export(e.to_string()))?;
        Ok(bytes)
    }

    /// Export and save the frame as a PNG file.
    pub fn save_png(&mut self, path: &Path) -> DeepfryResult<()> {
        let bytes = self.export_png()?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir '{}'", parent.display()))?;
        }
        std::fs::write(path, bytes).with_context(|| format!("write png '{}'", path.display()))?;
        Ok(())
    }
}

fn draw_handles(frame: &mut Surface, layer: &Layer) {
    let c = layer.corners();

    frame.draw_line(c.tl, c.tr, HANDLE_STROKE);
    frame.draw_line(c.tr, c.br, HANDLE_STROKE);
    frame.draw_line(c.br, c.bl, HANDLE_STROKE);
    frame.draw_line(c.bl, c.tl, HANDLE_STROKE);
    frame.draw_line(c.top, c.rotate, HANDLE_STROKE);

    for corner in [c.tl, c.tr, c.br, c.bl] {
        frame.fill_rect_centered(corner, 4.0, HANDLE_FILL);
        frame.stroke_rect_centered(corner, 4.0, HANDLE_STROKE);
    }

    frame.fill_circle(c.rotate, 5.0, HANDLE_FILL);
    frame.stroke_circle(c.rotate, 5.0, HANDLE_STROKE);
}
