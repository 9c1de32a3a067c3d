/// Review screen orchestration
///
/// `ReviewSession` is the one mutable session context of the edit screen.
/// It owns the photos, the transform model, the hole assignments, the
/// selection, the decorations with their interaction engine and renderer,
/// the request guard and the dialogs. Backend calls are split in two: a
/// `begin_*` step that validates and hands out a job with its ticket, and a
/// `complete_*` step that applies the response if the ticket is still
/// current. The app shell runs the job in between.

use std::fmt::Display;

use tracing::{debug, info, warn};

use crate::backend::TemplateSource;
use crate::color;
use crate::config::AppConfig;
use crate::delivery::FinalizeSnapshot;
use crate::error::{EditorError, EditorResult};
use crate::geometry::{default_crop, Point, PreviewScaling, Rect, Size};
use crate::interaction::render::{DecorationRenderer, HitTarget};
use crate::interaction::transformable::TransformableEngine;
use crate::state::bus::{AppEvent, EventBus, Screen};
use crate::state::data::{ActiveTemplate, ImageBlob, Photo, PhotoId};
use crate::state::decoration::{
    DecorationId, DecorationRef, DecorationSet, EstimatedTextMeasurer, Justify, TextEdit, TextMeasurer,
};
use crate::state::edit::{BackgroundPatch, BackgroundSettings, FilterPatch, FilterValues};
use crate::state::modal::{ModalSlot, ModalTicket};
use crate::state::requests::{RequestKind, RequestTicket, RequestTracker};
use crate::state::transform::{move_item, PhotoTransformModel};

/// Side panels of the review screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Panel {
    Photos,
    Styles,
    Filters,
    Stickers,
    Templates,
    Backgrounds,
}

/// A stylization to run against the backend
#[derive(Debug, Clone)]
pub struct StylizeJob {
    pub ticket: RequestTicket,
    pub prompt: String,
    pub style_id: Option<String>,
    /// Stylization always starts from the as-captured photo
    pub image: ImageBlob,
}

#[derive(Debug, Clone)]
pub struct BackgroundJob {
    pub ticket: RequestTicket,
    pub image: ImageBlob,
    pub settings: BackgroundSettings,
}

/// What the crop dialog is opened with
#[derive(Debug, Clone)]
pub struct CropRequest {
    pub photo: PhotoId,
    /// Pre-crop image (background already applied)
    pub image: ImageBlob,
    pub aspect_ratio: f32,
    pub initial: Rect,
}

/// Text dialog: `id` is `None` when adding a new text box
#[derive(Debug, Clone, PartialEq)]
pub struct TextDialogRequest {
    pub id: Option<DecorationId>,
    pub current: TextEdit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorTarget {
    Template,
    Background(PhotoId),
}

pub struct ReviewSession {
    config: AppConfig,
    photos: Vec<Photo>,
    model: PhotoTransformModel,
    /// Hole index → photo shown in it
    assignments: Vec<PhotoId>,
    /// Selected photo indices, in selection order
    selected: Vec<usize>,
    selected_hole: Option<usize>,
    template: Option<ActiveTemplate>,
    is_inverted: bool,
    decorations: DecorationSet,
    engine: TransformableEngine,
    renderer: DecorationRenderer,
    measurer: Box<dyn TextMeasurer + Send>,
    requests: RequestTracker,
    panel: Option<Panel>,
    container: Size,
    next_photo_id: u64,
    bus: EventBus,
    pub crop_dialog: ModalSlot<CropRequest>,
    pub text_dialog: ModalSlot<TextDialogRequest>,
    pub color_dialog: ModalSlot<ColorTarget>,
}

impl std::fmt::Debug for ReviewSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewSession")
            .field("photos", &self.photos.len())
            .field("assignments", &self.assignments)
            .field("selected", &self.selected)
            .field("panel", &self.panel)
            .finish()
    }
}

impl ReviewSession {
    pub fn new(config: AppConfig) -> Self {
        Self {
            engine: TransformableEngine::new(config.interaction()),
            config,
            photos: Vec::new(),
            model: PhotoTransformModel::new(),
            assignments: Vec::new(),
            selected: Vec::new(),
            selected_hole: None,
            template: None,
            is_inverted: false,
            decorations: DecorationSet::new(),
            renderer: DecorationRenderer::new(),
            measurer: Box::new(EstimatedTextMeasurer),
            requests: RequestTracker::new(),
            panel: None,
            container: Size::default(),
            next_photo_id: 0,
            bus: EventBus::default(),
            crop_dialog: ModalSlot::default(),
            text_dialog: ModalSlot::default(),
            color_dialog: ModalSlot::default(),
        }
    }

    // ---- session lifecycle ----

    /// Start a fresh session, discarding every previous edit
    pub fn start(&mut self, shots: Vec<(ImageBlob, Option<String>)>, template: ActiveTemplate) -> EditorResult<()> {
        let holes = template.info.holes.len();
        if shots.is_empty() {
            return Err(EditorError::validation("no photos to review"));
        }
        if holes > 0 && shots.len() != holes {
            return Err(EditorError::validation(format!(
                "this template needs exactly {holes} photos, got {}",
                shots.len()
            )));
        }

        self.photos = shots
            .into_iter()
            .map(|(original, video_path)| {
                self.next_photo_id += 1;
                Photo { id: PhotoId(self.next_photo_id), original, video_path }
            })
            .collect();

        self.model.init(self.photos.len());
        for (i, photo) in self.photos.iter().enumerate() {
            self.model.set_original(i, photo.original.clone())?;
        }
        self.assignments = self.photos.iter().map(|p| p.id).collect();
        self.template = Some(template);
        self.is_inverted = false;
        self.selected.clear();
        self.selected_hole = None;
        self.decorations.clear();
        self.engine.reset();
        self.renderer.clear();
        self.requests.reset();
        self.panel = None;
        self.crop_dialog.cancel();
        self.text_dialog.cancel();
        self.color_dialog.cancel();

        info!(photos = self.photos.len(), "review session started");
        self.bus.publish(AppEvent::ScreenChanged(Screen::Review));
        self.bus.publish(AppEvent::ThumbnailsInvalidated);
        Ok(())
    }

    /// Back from the result screen with every edit kept
    pub fn continue_editing(&mut self) {
        self.bus.publish(AppEvent::ScreenChanged(Screen::Review));
        self.refresh_decorations();
    }

    pub fn drain_events(&mut self) -> Vec<AppEvent> {
        self.bus.drain()
    }

    // ---- read access for the view ----

    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    pub fn model(&self) -> &PhotoTransformModel {
        &self.model
    }

    pub fn template(&self) -> Option<&ActiveTemplate> {
        self.template.as_ref()
    }

    pub fn decorations(&self) -> &DecorationSet {
        &self.decorations
    }

    pub fn engine(&self) -> &TransformableEngine {
        &self.engine
    }

    pub fn renderer(&self) -> &DecorationRenderer {
        &self.renderer
    }

    pub fn panel(&self) -> Option<Panel> {
        self.panel
    }

    pub fn selected(&self) -> &[usize] {
        &self.selected
    }

    pub fn selected_hole(&self) -> Option<usize> {
        self.selected_hole
    }

    pub fn is_inverted(&self) -> bool {
        self.is_inverted
    }

    /// Current composed image of a photo, filters not applied
    pub fn composed(&mut self, index: usize) -> EditorResult<ImageBlob> {
        self.model.compose(index)
    }

    /// What the preview and thumbnails show: composed, filters approximated
    pub fn preview(&mut self, index: usize) -> EditorResult<ImageBlob> {
        self.model.preview_blob(index)
    }

    pub fn is_loading(&self, index: usize) -> bool {
        self.photos.get(index).is_some_and(|p| self.requests.is_loading(p.id))
    }

    pub fn photo_index(&self, id: PhotoId) -> Option<usize> {
        self.photos.iter().position(|p| p.id == id)
    }

    /// Photo index shown in `hole`
    pub fn hole_photo(&self, hole: usize) -> Option<usize> {
        self.assignments.get(hole).and_then(|id| self.photo_index(*id))
    }

    /// Hole showing photo `index`
    pub fn photo_hole(&self, index: usize) -> Option<usize> {
        let id = self.photos.get(index)?.id;
        self.assignments.iter().position(|a| *a == id)
    }

    fn photo_id(&self, index: usize) -> EditorResult<PhotoId> {
        self.photos
            .get(index)
            .map(|p| p.id)
            .ok_or(EditorError::InvalidIndex { index, len: self.photos.len() })
    }

    fn invalidate_preview(&mut self, index: usize) {
        self.bus.publish(AppEvent::PreviewInvalidated { index });
        self.bus.publish(AppEvent::ThumbnailsInvalidated);
    }

    // ---- preview geometry ----

    pub fn set_container(&mut self, container: Size) {
        if self.container != container {
            self.container = container;
            self.refresh_decorations();
        }
    }

    /// Contain-fit of the template in the preview container; `None` until
    /// both are known
    pub fn preview_scaling(&self) -> Option<PreviewScaling> {
        let template = self.template.as_ref()?;
        PreviewScaling::contain(template.size, self.container)
    }

    /// Reconcile decoration nodes with the current state
    pub fn refresh_decorations(&mut self) {
        let Some(scaling) = self.preview_scaling() else {
            return;
        };
        let pass = self.renderer.render(
            &self.decorations,
            self.engine.active().map(|a| a.id),
            self.engine.editing(),
            &scaling,
        );
        debug!(?pass, "decorations reconciled");
    }

    // ---- selection and panels ----

    pub fn toggle_photo_selection(&mut self, index: usize) -> EditorResult<()> {
        self.photo_id(index)?;
        match self.selected.iter().position(|i| *i == index) {
            Some(pos) => {
                self.selected.remove(pos);
            }
            None => self.selected.push(index),
        }
        Ok(())
    }

    /// Click on a hole in the preview. With exactly one photo selected that
    /// is not already there, the photo moves into the hole; otherwise the
    /// hole's photo toggles its selection.
    pub fn select_hole(&mut self, hole: usize) -> EditorResult<()> {
        if hole >= self.assignments.len() {
            return Err(EditorError::InvalidIndex { index: hole, len: self.assignments.len() });
        }
        if self.panel != Some(Panel::Photos) {
            self.panel = Some(Panel::Photos);
        }

        if let &[only] = self.selected.as_slice() {
            if self.photo_hole(only) != Some(hole) {
                self.swap(hole, only)?;
                self.selected.clear();
                return Ok(());
            }
        }

        self.selected_hole = Some(hole);
        if let Some(index) = self.hole_photo(hole) {
            self.toggle_photo_selection(index)?;
        }
        Ok(())
    }

    /// Put photo `index` into `hole`; the photo that was there takes the
    /// photo's previous hole
    pub fn swap(&mut self, hole: usize, index: usize) -> EditorResult<()> {
        let incoming = self.photo_id(index)?;
        let Some(&outgoing) = self.assignments.get(hole) else {
            return Err(EditorError::InvalidIndex { index: hole, len: self.assignments.len() });
        };
        if let Some(previous) = self.assignments.iter().position(|a| *a == incoming) {
            self.assignments[previous] = outgoing;
        }
        self.assignments[hole] = incoming;
        self.selected_hole = None;
        self.bus.publish(AppEvent::PreviewInvalidated { index });
        Ok(())
    }

    /// Move a photo one step up (-1) or down (+1) in the strip
    pub fn move_photo(&mut self, index: usize, direction: isize) -> EditorResult<()> {
        let target = index as isize + direction;
        if target < 0 || target as usize >= self.photos.len() {
            return Ok(());
        }
        self.reorder_photos(index, target as usize)
    }

    /// Reorder photos. Hole assignments go back to sequential order and
    /// selections follow the moved photos.
    pub fn reorder_photos(&mut self, from: usize, to: usize) -> EditorResult<()> {
        if self.requests.any_loading(RequestKind::Stylize) {
            return Err(EditorError::not_ready("wait for stylization to finish before reordering"));
        }
        self.model.reorder(from, to)?;
        move_item(&mut self.photos, from, to);
        self.assignments = self.photos.iter().map(|p| p.id).collect();

        let remap = |idx: usize| -> usize {
            if idx == from {
                to
            } else if from < to && idx > from && idx <= to {
                idx - 1
            } else if from > to && idx >= to && idx < from {
                idx + 1
            } else {
                idx
            }
        };
        self.selected = self.selected.iter().map(|i| remap(*i)).collect();
        self.bus.publish(AppEvent::ThumbnailsInvalidated);
        Ok(())
    }

    /// Toolbar click. Clicking the open panel closes it.
    pub fn open_panel(&mut self, panel: Panel) {
        if self.panel == Some(panel) {
            self.close_panels();
            return;
        }
        self.clear_selections();
        self.panel = Some(panel);
    }

    pub fn close_panels(&mut self) {
        self.panel = None;
        self.clear_selections();
    }

    /// Drop hole and photo selections, keeping photos still being processed
    pub fn clear_selections(&mut self) {
        self.selected_hole = None;
        let loading: Vec<bool> = (0..self.photos.len()).map(|i| self.is_loading(i)).collect();
        self.selected.retain(|i| loading.get(*i).copied().unwrap_or(false));
    }

    // ---- stylization ----

    /// Validate and issue one stylize job per selected photo
    pub fn begin_stylize(&mut self, prompt: &str, style_id: Option<&str>) -> EditorResult<Vec<StylizeJob>> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(EditorError::validation("a style prompt is required"));
        }
        if self.selected.is_empty() {
            return Err(EditorError::validation("select a photo to apply the style to"));
        }

        let mut jobs = Vec::with_capacity(self.selected.len());
        for &index in &self.selected {
            let Some(photo) = self.photos.get(index) else {
                continue;
            };
            jobs.push(StylizeJob {
                ticket: self.requests.begin(photo.id, RequestKind::Stylize),
                prompt: prompt.to_string(),
                style_id: style_id.map(str::to_string),
                image: photo.original.clone(),
            });
        }
        Ok(jobs)
    }

    /// Apply a stylization response. Failures only affect this photo.
    pub fn complete_stylize<E: Display>(&mut self, job: StylizeJob, result: Result<ImageBlob, E>) {
        if !self.requests.finish(job.ticket) {
            return;
        }
        let Some(index) = self.photo_index(job.ticket.photo) else {
            return;
        };

        match result {
            Ok(blob) => {
                // A mask computed against the previous base must not land on the new one
                self.requests.supersede(job.ticket.photo, RequestKind::Background);
                let applied = self
                    .model
                    .set_stylized(index, &job.prompt, job.style_id.as_deref(), blob)
                    .and_then(|_| self.model.compose(index).map(|_| ()));
                match applied {
                    Ok(()) => info!(index, prompt = %job.prompt, "stylized"),
                    Err(e) => {
                        warn!(index, error = %e, "stylized image could not be composed");
                        self.bus.publish(AppEvent::error("Applying the style failed. Please try again."));
                    }
                }
            }
            Err(e) => {
                warn!(index, error = %e, "stylization failed");
                self.bus.publish(AppEvent::error("Applying the style failed. Please try again."));
            }
        }
        self.invalidate_preview(index);
    }

    /// Back to the original photo; in-flight stylize and mask responses are dropped
    pub fn reset_style(&mut self, index: usize) -> EditorResult<()> {
        let id = self.photo_id(index)?;
        self.requests.supersede(id, RequestKind::Stylize);
        self.requests.supersede(id, RequestKind::Background);
        self.model.reset_to_original(index)?;
        self.model.compose(index)?;
        self.invalidate_preview(index);
        Ok(())
    }

    // ---- background ----

    /// Enable background removal for a photo and issue the mask request
    pub fn begin_background_removal(
        &mut self,
        index: usize,
        patch: Option<&BackgroundPatch>,
    ) -> EditorResult<BackgroundJob> {
        let id = self.photo_id(index)?;
        self.model.set_background_removal(index, true, patch)?;
        Ok(BackgroundJob {
            ticket: self.requests.begin(id, RequestKind::Background),
            image: self.model.base_blob(index)?,
            settings: self.model.transform(index)?.background.settings,
        })
    }

    /// Store the mask, or fall back to the unremoved image on failure
    pub fn complete_background_removal<E: Display>(&mut self, job: BackgroundJob, result: Result<ImageBlob, E>) {
        if !self.requests.finish(job.ticket) {
            return;
        }
        let Some(index) = self.photo_index(job.ticket.photo) else {
            return;
        };

        let applied = match result {
            Ok(mask) => self.model.set_bg_removed_blob(index, mask).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = applied {
            warn!(index, error = %e, "background removal failed");
            self.bus.publish(AppEvent::error("Failed to remove background"));
            if let Err(e) = self.model.set_background_removal(index, false, None) {
                warn!(index, error = %e, "could not disable background removal");
            }
        }
        self.invalidate_preview(index);
    }

    pub fn disable_background(&mut self, index: usize) -> EditorResult<()> {
        self.model.set_background_removal(index, false, None)?;
        self.model.set_bg_replacement(index, false, None)?;
        self.invalidate_preview(index);
        Ok(())
    }

    /// Pick a replacement color (`None` restores the original background).
    /// Returns a mask job when the photo has no mask yet.
    pub fn set_background_color(&mut self, index: usize, color: Option<&str>) -> EditorResult<Option<BackgroundJob>> {
        let Some(color) = color else {
            self.disable_background(index)?;
            return Ok(None);
        };
        color::parse_hex(color)?;

        self.model.set_bg_replacement(index, true, Some(color.to_string()))?;
        let job = if self.model.cache(index)?.bg_removed.is_none() {
            self.bus.publish(AppEvent::info("Removing background..."));
            Some(self.begin_background_removal(index, None)?)
        } else {
            self.model.set_background_removal(index, true, None)?;
            None
        };
        self.invalidate_preview(index);
        Ok(job)
    }

    // ---- crop ----

    /// Open the crop dialog for a photo, seeded with its current crop or a
    /// centered rectangle matching its hole
    pub fn begin_crop(&mut self, index: usize) -> EditorResult<ModalTicket> {
        let id = self.photo_id(index)?;
        let image = self.model.pre_crop_blob(index)?;
        let aspect_ratio = self
            .photo_hole(index)
            .zip(self.template.as_ref())
            .and_then(|(hole, t)| t.info.holes.get(hole))
            .map(|h| h.aspect_ratio())
            .unwrap_or(1.0);

        let initial = match self.model.transform(index)?.crop.data {
            Some(rect) => rect,
            None => {
                let size = image.dimensions()?;
                default_crop(size.width, size.height, aspect_ratio)
            }
        };

        self.crop_dialog.open(CropRequest { photo: id, image, aspect_ratio, initial })
    }

    /// Close the crop dialog; `None` means cancelled
    pub fn apply_crop(&mut self, ticket: ModalTicket, rect: Option<Rect>) -> EditorResult<()> {
        let Some((request, Some(rect))) = self.crop_dialog.resolve(ticket, rect) else {
            return Ok(());
        };
        let Some(index) = self.photo_index(request.photo) else {
            return Ok(());
        };
        self.model.set_crop(index, Some(rect))?;
        self.model.compose(index)?;
        self.invalidate_preview(index);
        Ok(())
    }

    pub fn remove_crop(&mut self, index: usize) -> EditorResult<()> {
        self.model.set_crop(index, None)?;
        self.invalidate_preview(index);
        Ok(())
    }

    // ---- filters ----

    /// Apply filter values to the selected photos, or to all when none is selected
    pub fn set_filters(&mut self, patch: &FilterPatch) -> EditorResult<()> {
        let targets: Vec<usize> = if self.selected.is_empty() {
            (0..self.photos.len()).collect()
        } else {
            self.selected.clone()
        };
        for index in targets {
            self.model.set_filters(index, patch)?;
            self.bus.publish(AppEvent::PreviewInvalidated { index });
        }
        Ok(())
    }

    /// Filter values the sliders show: the first selected photo's, or the
    /// first photo's when edits go to every photo
    pub fn shown_filters(&self) -> (usize, FilterValues) {
        let index = self.selected.first().copied().unwrap_or(0);
        let values = self.model.transform(index).map(|t| t.filters.values).unwrap_or_default();
        (index, values)
    }

    // ---- template ----

    /// Switch to another template with the same number of holes
    pub fn change_template(&mut self, template: ActiveTemplate) -> EditorResult<()> {
        let holes = template.info.holes.len();
        if holes != self.photos.len() {
            return Err(EditorError::validation(format!(
                "template has {holes} holes but the session has {} photos",
                self.photos.len()
            )));
        }
        self.template = Some(template);
        self.refresh_decorations();
        self.bus.publish(AppEvent::ThumbnailsInvalidated);
        Ok(())
    }

    /// Recolor a default template; white restores the original
    pub fn recolor_template(&mut self, hex: &str) -> EditorResult<()> {
        let fill = color::parse_hex(hex)?;
        let template = self
            .template
            .as_mut()
            .ok_or_else(|| EditorError::not_ready("no template loaded"))?;
        if !template.info.is_default {
            return Err(EditorError::validation("only default templates can be recolored"));
        }

        template.recolored = if color::is_white(&fill) {
            None
        } else {
            let image = template.image.decode()?.to_rgba8();
            Some(ImageBlob::encode_png(&color::recolor_opaque(&image, fill))?)
        };
        Ok(())
    }

    /// Open the color picker for the template or a photo background
    pub fn begin_color(&mut self, target: ColorTarget) -> EditorResult<ModalTicket> {
        self.color_dialog.open(target)
    }

    /// Close the color picker; `None` means cancelled. A background color
    /// may need a mask job.
    pub fn finish_color(&mut self, ticket: ModalTicket, color: Option<String>) -> EditorResult<Option<BackgroundJob>> {
        let Some((target, Some(color))) = self.color_dialog.resolve(ticket, color) else {
            return Ok(None);
        };
        match target {
            ColorTarget::Template => {
                self.recolor_template(&color)?;
                Ok(None)
            }
            ColorTarget::Background(photo) => match self.photo_index(photo) {
                Some(index) => self.set_background_color(index, Some(&color)),
                None => Ok(None),
            },
        }
    }

    pub fn toggle_inverted(&mut self) {
        self.is_inverted = !self.is_inverted;
    }

    // ---- decorations ----

    pub fn add_sticker(&mut self, path: &str, sticker_size: Size) -> EditorResult<DecorationId> {
        let template_size = self
            .template
            .as_ref()
            .map(|t| t.size)
            .ok_or_else(|| EditorError::not_ready("no template loaded"))?;
        let id = self
            .decorations
            .add_sticker_centered(path, sticker_size, template_size, self.config.sticker_width_ratio);
        self.refresh_decorations();
        Ok(id)
    }

    /// Open the text dialog for a new text box
    pub fn begin_add_text(&mut self) -> EditorResult<ModalTicket> {
        self.text_dialog.open(TextDialogRequest {
            id: None,
            current: TextEdit {
                text: Some(String::new()),
                font: Some("Arial".to_string()),
                color: Some("#000000".to_string()),
                font_size: Some(self.config.default_text_size),
                justify: Some(Justify::Center),
            },
        })
    }

    /// Open the text dialog for an existing text box
    pub fn begin_edit_text(&mut self, id: DecorationId) -> EditorResult<ModalTicket> {
        let Some(DecorationRef::Text(text)) = self.decorations.get(id) else {
            return Err(EditorError::validation("not a text box"));
        };
        let current = TextEdit {
            text: Some(text.text.clone()),
            font: Some(text.font.clone()),
            color: Some(text.color.clone()),
            font_size: Some(text.font_size),
            justify: Some(text.justify),
        };
        let ticket = self.text_dialog.open(TextDialogRequest { id: Some(id), current })?;
        self.engine.set_editing(Some(id));
        Ok(ticket)
    }

    /// Close the text dialog; `None` means cancelled. Empty text is ignored.
    pub fn finish_text(&mut self, ticket: ModalTicket, edit: Option<TextEdit>) -> EditorResult<Option<DecorationId>> {
        let Some((request, edit)) = self.text_dialog.resolve(ticket, edit) else {
            return Ok(None);
        };
        self.engine.set_editing(None);
        let Some(edit) = edit else {
            self.refresh_decorations();
            return Ok(None);
        };
        if edit.text.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Ok(None);
        }

        let id = match request.id {
            Some(id) => {
                self.decorations.update_text(id, edit, self.measurer.as_ref());
                id
            }
            None => {
                let template_size = self
                    .template
                    .as_ref()
                    .map(|t| t.size)
                    .ok_or_else(|| EditorError::not_ready("no template loaded"))?;
                let mut full = request.current;
                for (slot, value) in [(&mut full.text, edit.text), (&mut full.font, edit.font), (&mut full.color, edit.color)] {
                    if value.is_some() {
                        *slot = value;
                    }
                }
                let font_size = edit.font_size.or(full.font_size).unwrap_or(self.config.default_text_size);
                let id = self.decorations.add_text_centered(
                    full.text.as_deref().unwrap_or_default(),
                    full.font.as_deref().unwrap_or("Arial"),
                    full.color.as_deref().unwrap_or("#000000"),
                    font_size,
                    self.measurer.as_ref(),
                    template_size,
                );
                if let Some(justify) = edit.justify {
                    self.decorations.update_text(
                        id,
                        TextEdit { justify: Some(justify), ..Default::default() },
                        self.measurer.as_ref(),
                    );
                }
                id
            }
        };
        self.refresh_decorations();
        Ok(Some(id))
    }

    pub fn delete_decoration(&mut self, id: DecorationId) -> bool {
        let removed = self.decorations.remove(id);
        if removed {
            if self.engine.active().is_some_and(|a| a.id == id) {
                self.engine.reset();
                self.bus.publish(AppEvent::SelectionChanged(None));
            }
            self.refresh_decorations();
        }
        removed
    }

    /// Pointer pressed on the preview (screen pixels)
    pub fn pointer_pressed(&mut self, pointer: Point) {
        let Some(scaling) = self.preview_scaling() else {
            return;
        };
        let before = self.engine.active().map(|a| a.id);

        match self.renderer.hit_test(pointer) {
            Some(hit) => match hit.target {
                HitTarget::Close => {
                    self.delete_decoration(hit.decoration);
                    return;
                }
                HitTarget::ResizeRotate => {
                    self.engine.resize_rotate_down(hit.decoration, &self.decorations, pointer, &scaling);
                }
                HitTarget::Body => {
                    self.engine.pointer_down(hit.decoration, &self.decorations, pointer);
                }
            },
            None => {
                self.engine.deselect();
            }
        }

        let after = self.engine.active().map(|a| a.id);
        if before != after {
            self.bus.publish(AppEvent::SelectionChanged(after));
        }
        self.refresh_decorations();
    }

    pub fn pointer_moved(&mut self, pointer: Point) -> bool {
        let Some(scaling) = self.preview_scaling() else {
            return false;
        };
        let changed = self
            .engine
            .pointer_move(&mut self.decorations, pointer, &scaling, self.measurer.as_ref());
        if changed {
            self.refresh_decorations();
        }
        changed
    }

    pub fn pointer_released(&mut self) {
        self.engine.pointer_up();
        self.refresh_decorations();
    }

    // ---- finalize ----

    /// Resolve every hole's photo and collect everything compose_image needs
    pub fn finalize_snapshot(&mut self) -> EditorResult<FinalizeSnapshot> {
        let template = self
            .template
            .as_ref()
            .ok_or_else(|| EditorError::not_ready("no template loaded"))?;
        let holes = template.info.holes.clone();
        if holes.len() != self.assignments.len() {
            return Err(EditorError::validation(format!(
                "this template needs exactly {} photos, got {}",
                holes.len(),
                self.assignments.len()
            )));
        }
        let template_source = match &template.recolored {
            Some(blob) => TemplateSource::File(blob.clone()),
            None => TemplateSource::Path(template.info.template_path.clone()),
        };
        let transformations = (0..holes.len()).map(|h| template.hole_transform(h)).collect();

        let mut hole_photos = Vec::with_capacity(holes.len());
        let mut unapplied_colors = Vec::with_capacity(holes.len());
        let mut video_paths = Vec::new();
        for hole in 0..holes.len() {
            let index = self
                .hole_photo(hole)
                .ok_or_else(|| EditorError::not_ready(format!("hole {hole} has no photo")))?;
            self.model.compose(index)?;
            let transform = self.model.transform(index)?;
            let background = &transform.background;

            // A color the local pipeline had no mask for is left to the backend
            let missing_mask = self.model.cache(index)?.bg_removed.is_none();
            unapplied_colors.push(match (&background.replacement_color, background.replaced && missing_mask) {
                (Some(color), true) => Some(color.clone()),
                _ => None,
            });

            hole_photos.push(index);
            if let Some(path) = &self.photos[index].video_path {
                video_paths.push(path.clone());
            }
        }

        Ok(FinalizeSnapshot {
            template: template_source,
            holes,
            transformations,
            stickers: self.decorations.stickers().to_vec(),
            texts: self.decorations.texts().to_vec(),
            is_inverted: self.is_inverted,
            background_colors: unapplied_colors.iter().any(Option::is_some).then_some(unapplied_colors),
            video_paths,
            model: self.model.clone(),
            hole_photos,
        })
    }

    pub fn finalize_failed(&mut self, error: &dyn Display) {
        self.bus.publish(AppEvent::FinalizeFailed(error.to_string()));
    }

    /// Originals in strip order, for the originals zip
    pub fn originals(&self) -> Vec<ImageBlob> {
        self.photos.iter().map(|p| p.original.clone()).collect()
    }

    /// Stylized images with their prompts, for the generated zip
    pub fn stylized(&self) -> Vec<(usize, String, ImageBlob)> {
        self.model.stylized_blobs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::fixtures::{solid_png, template};

    fn active_template(holes: usize) -> ActiveTemplate {
        ActiveTemplate {
            info: template(holes),
            size: Size::new(340.0, 20.0 + holes as f32 * 220.0),
            image: solid_png(34, 66, [255, 255, 255, 255]),
            recolored: None,
        }
    }

    fn session(count: usize) -> ReviewSession {
        let mut s = ReviewSession::new(AppConfig::default());
        let shots = (0..count)
            .map(|i| (solid_png(60, 40, [i as u8 * 40, 0, 0, 255]), Some(format!("/static/videos/v{i}.webm"))))
            .collect();
        s.start(shots, active_template(count)).unwrap();
        s.set_container(Size::new(340.0, 20.0 + count as f32 * 220.0));
        s.drain_events();
        s
    }

    #[test]
    fn start_rejects_wrong_photo_count() {
        let mut s = ReviewSession::new(AppConfig::default());
        let err = s
            .start(vec![(solid_png(4, 4, [0, 0, 0, 255]), None)], active_template(3))
            .unwrap_err();
        assert!(matches!(err, EditorError::Validation(_)));
    }

    #[test]
    fn start_resets_previous_session() {
        let mut s = session(2);
        s.add_sticker("/s.png", Size::new(10.0, 10.0)).unwrap();
        s.toggle_photo_selection(1).unwrap();

        s.start(
            vec![(solid_png(4, 4, [0, 0, 0, 255]), None), (solid_png(4, 4, [0, 0, 0, 255]), None)],
            active_template(2),
        )
        .unwrap();
        assert!(s.decorations().is_empty());
        assert!(s.selected().is_empty());
        assert!(s.drain_events().contains(&AppEvent::ScreenChanged(Screen::Review)));
    }

    #[test]
    fn swap_exchanges_holes() {
        let mut s = session(3);
        s.swap(0, 2).unwrap();
        assert_eq!(s.hole_photo(0), Some(2));
        assert_eq!(s.hole_photo(2), Some(0));
        assert_eq!(s.hole_photo(1), Some(1));
    }

    #[test]
    fn select_hole_swaps_single_selected_photo() {
        let mut s = session(3);
        s.toggle_photo_selection(2).unwrap();
        s.select_hole(0).unwrap();
        assert_eq!(s.hole_photo(0), Some(2));
        assert!(s.selected().is_empty());
        assert_eq!(s.panel(), Some(Panel::Photos));

        // No selection: the hole's photo becomes selected
        s.select_hole(1).unwrap();
        assert_eq!(s.selected(), &[1]);
    }

    #[test]
    fn reorder_remaps_selection_and_resets_assignments() {
        let mut s = session(3);
        let moved = s.photos()[0].id;
        s.swap(0, 2).unwrap();
        s.toggle_photo_selection(0).unwrap();
        s.toggle_photo_selection(1).unwrap();

        s.reorder_photos(0, 2).unwrap();

        assert_eq!(s.photos()[2].id, moved);
        assert_eq!(s.selected(), &[2, 0]);
        for hole in 0..3 {
            assert_eq!(s.hole_photo(hole), Some(hole));
        }
    }

    #[test]
    fn reorder_is_blocked_while_stylizing() {
        let mut s = session(2);
        s.toggle_photo_selection(0).unwrap();
        let jobs = s.begin_stylize("watercolor", None).unwrap();
        assert!(matches!(s.reorder_photos(0, 1), Err(EditorError::NotReady(_))));

        s.complete_stylize(jobs[0].clone(), Ok::<_, EditorError>(solid_png(60, 40, [1, 1, 1, 255])));
        assert!(s.reorder_photos(0, 1).is_ok());
    }

    #[test]
    fn stylize_requires_prompt_and_selection() {
        let mut s = session(1);
        assert!(matches!(s.begin_stylize("  ", None), Err(EditorError::Validation(_))));
        assert!(matches!(s.begin_stylize("anime", None), Err(EditorError::Validation(_))));
    }

    #[test]
    fn stale_stylize_response_is_dropped() {
        let mut s = session(1);
        s.toggle_photo_selection(0).unwrap();
        let old = s.begin_stylize("first", None).unwrap().remove(0);
        let new = s.begin_stylize("second", None).unwrap().remove(0);

        s.complete_stylize(new, Ok::<_, EditorError>(solid_png(60, 40, [2, 2, 2, 255])));
        s.complete_stylize(old, Ok::<_, EditorError>(solid_png(60, 40, [9, 9, 9, 255])));

        let base = &s.model().transform(0).unwrap().base;
        assert_eq!(base.style_prompt.as_deref(), Some("second"));
        assert!(!s.is_loading(0));
    }

    #[test]
    fn mask_for_the_old_base_is_dropped_after_stylize() {
        let mut s = session(1);
        let mask = s.begin_background_removal(0, None).unwrap();
        s.toggle_photo_selection(0).unwrap();
        let style = s.begin_stylize("blue", None).unwrap().remove(0);

        let stylized = solid_png(60, 40, [0, 0, 255, 255]);
        s.complete_stylize(style, Ok::<_, EditorError>(stylized.clone()));
        s.complete_background_removal(mask, Ok::<_, EditorError>(solid_png(60, 40, [255, 255, 0, 128])));

        assert!(s.model().cache(0).unwrap().bg_removed.is_none());
        assert!(!s.is_loading(0));

        // The color needs a fresh mask of the stylized base
        let job = s.set_background_color(0, Some("#00ff00")).unwrap().unwrap();
        assert_eq!(job.image, stylized);
        assert_eq!(s.composed(0).unwrap(), stylized);
    }

    #[test]
    fn reset_drops_late_stylize_and_mask_responses() {
        let mut s = session(1);
        s.toggle_photo_selection(0).unwrap();
        let style = s.begin_stylize("anime", None).unwrap().remove(0);
        let mask = s.begin_background_removal(0, None).unwrap();

        s.reset_style(0).unwrap();
        assert!(!s.is_loading(0));

        s.complete_stylize(style, Ok::<_, EditorError>(solid_png(60, 40, [9, 9, 9, 255])));
        s.complete_background_removal(mask, Ok::<_, EditorError>(solid_png(60, 40, [0, 0, 0, 0])));

        assert!(!s.model().has_stylized(0));
        assert!(s.model().cache(0).unwrap().bg_removed.is_none());
        assert_eq!(s.composed(0).unwrap(), s.photos()[0].original);
    }

    #[test]
    fn stylize_failure_toasts_and_keeps_state() {
        let mut s = session(2);
        s.toggle_photo_selection(0).unwrap();
        s.toggle_photo_selection(1).unwrap();
        let mut jobs = s.begin_stylize("pixel", Some("p1")).unwrap();
        let second = jobs.pop().unwrap();
        let first = jobs.pop().unwrap();

        s.complete_stylize(first, Err(EditorError::backend(500, "gpu busy")));
        s.complete_stylize(second, Ok::<_, EditorError>(solid_png(60, 40, [3, 3, 3, 255])));

        assert!(!s.model().has_stylized(0));
        assert!(s.model().has_stylized(1));
        assert!(s.drain_events().iter().any(|e| matches!(e, AppEvent::Toast { .. })));
    }

    #[test]
    fn background_failure_falls_back_to_unremoved_image() {
        let mut s = session(1);
        let job = s.begin_background_removal(0, None).unwrap();
        assert!(s.is_loading(0));
        s.complete_background_removal(job, Err(EditorError::backend(500, "mask failed")));

        assert!(!s.model().transform(0).unwrap().background.enabled);
        assert_eq!(s.model().pre_crop_blob(0).unwrap(), s.photos()[0].original);
    }

    #[test]
    fn background_color_requests_mask_only_when_missing() {
        let mut s = session(1);
        let job = s.set_background_color(0, Some("#00ff00")).unwrap().unwrap();
        assert_eq!(job.ticket.kind, RequestKind::Background);
        s.complete_background_removal(job, Ok::<_, EditorError>(solid_png(60, 40, [0, 0, 0, 0])));

        assert!(s.set_background_color(0, Some("#0000ff")).unwrap().is_none());
        let bg = &s.model().transform(0).unwrap().background;
        assert!(bg.enabled && bg.replaced);
        assert_eq!(bg.replacement_color.as_deref(), Some("#0000ff"));

        assert!(s.set_background_color(0, None).unwrap().is_none());
        assert!(!s.model().transform(0).unwrap().background.replaced);
        assert!(s.set_background_color(0, Some("nope")).is_err());
    }

    #[test]
    fn crop_dialog_seeds_hole_aspect_and_applies() {
        let mut s = session(1);
        let ticket = s.begin_crop(0).unwrap();
        let request = s.crop_dialog.request().unwrap().clone();
        assert_eq!(request.aspect_ratio, 1.5);
        assert_eq!(request.initial, Rect::new(0.0, 0.0, 60.0, 40.0));

        assert!(matches!(s.begin_crop(0), Err(EditorError::ModalBusy)));

        s.apply_crop(ticket, Some(Rect::new(0.0, 0.0, 30.0, 20.0))).unwrap();
        assert!(s.model().transform(0).unwrap().crop.enabled);
        assert_eq!(
            s.model().cache(0).unwrap().final_composed.as_ref().unwrap().dimensions().unwrap(),
            Size::new(30.0, 20.0)
        );
    }

    #[test]
    fn cancelled_crop_changes_nothing() {
        let mut s = session(1);
        let ticket = s.begin_crop(0).unwrap();
        s.apply_crop(ticket, None).unwrap();
        assert!(!s.model().transform(0).unwrap().crop.enabled);
        assert!(!s.crop_dialog.is_open());
    }

    #[test]
    fn filters_apply_to_selection_or_everything() {
        let mut s = session(2);
        s.set_filters(&FilterPatch { brightness: Some(120.0), ..Default::default() }).unwrap();
        assert_eq!(s.model().transform(1).unwrap().filters.values.brightness, 120.0);

        s.toggle_photo_selection(0).unwrap();
        s.set_filters(&FilterPatch { contrast: Some(50.0), ..Default::default() }).unwrap();
        assert_eq!(s.model().transform(0).unwrap().filters.values.contrast, 50.0);
        assert_eq!(s.model().transform(1).unwrap().filters.values.contrast, 100.0);

        assert!(s.drain_events().contains(&AppEvent::PreviewInvalidated { index: 0 }));
        assert_eq!(s.shown_filters().1.contrast, 50.0);
        assert_ne!(s.preview(1).unwrap(), s.composed(1).unwrap());
    }

    #[test]
    fn sliders_follow_the_selected_photo() {
        let mut s = session(2);
        s.toggle_photo_selection(1).unwrap();
        s.set_filters(&FilterPatch { warmth: Some(130.0), ..Default::default() }).unwrap();
        assert_eq!(s.shown_filters(), (1, FilterValues { warmth: 130.0, ..Default::default() }));

        s.toggle_photo_selection(1).unwrap();
        s.toggle_photo_selection(0).unwrap();
        assert_eq!(s.shown_filters(), (0, FilterValues::default()));

        // Nothing selected: the first photo stands in for all
        s.toggle_photo_selection(0).unwrap();
        assert_eq!(s.shown_filters().0, 0);
    }

    #[test]
    fn recolor_only_default_templates() {
        let mut s = session(1);
        s.recolor_template("#ff0000").unwrap();
        assert!(s.template().unwrap().recolored.is_some());
        s.recolor_template("#ffffff").unwrap();
        assert!(s.template().unwrap().recolored.is_none());

        let mut custom = active_template(1);
        custom.info.is_default = false;
        s.change_template(custom).unwrap();
        assert!(matches!(s.recolor_template("#ff0000"), Err(EditorError::Validation(_))));
        assert!(s.change_template(active_template(2)).is_err());
    }

    #[test]
    fn color_picker_routes_to_its_target() {
        let mut s = session(1);
        let ticket = s.begin_color(ColorTarget::Template).unwrap();
        assert!(matches!(s.begin_color(ColorTarget::Template), Err(EditorError::ModalBusy)));
        assert!(s.finish_color(ticket, Some("#123456".into())).unwrap().is_none());
        assert!(s.template().unwrap().recolored.is_some());

        let photo = s.photos()[0].id;
        let ticket = s.begin_color(ColorTarget::Background(photo)).unwrap();
        let job = s.finish_color(ticket, Some("#00ff00".into())).unwrap();
        assert!(job.is_some());
    }

    #[test]
    fn text_dialog_adds_and_edits() {
        let mut s = session(1);
        let ticket = s.begin_add_text().unwrap();
        let id = s
            .finish_text(ticket, Some(TextEdit { text: Some("Hello".into()), ..Default::default() }))
            .unwrap()
            .unwrap();
        let Some(DecorationRef::Text(t)) = s.decorations().get(id) else {
            panic!("text expected");
        };
        assert_eq!(t.font_size, 40.0);

        let ticket = s.begin_edit_text(id).unwrap();
        assert_eq!(s.engine().editing(), Some(id));
        s.finish_text(ticket, Some(TextEdit { color: Some("#ff0000".into()), ..Default::default() }))
            .unwrap();
        assert_eq!(s.engine().editing(), None);
        let Some(DecorationRef::Text(t)) = s.decorations().get(id) else {
            panic!("text expected");
        };
        assert_eq!(t.color, "#ff0000");

        let ticket = s.begin_add_text().unwrap();
        assert!(s.finish_text(ticket, Some(TextEdit { text: Some(" ".into()), ..Default::default() })).unwrap().is_none());
    }

    #[test]
    fn pointer_flow_selects_moves_and_deletes() {
        let mut s = session(1);
        // Container equals the template size, so screen == natural
        let id = s.add_sticker("/s.png", Size::new(10.0, 10.0)).unwrap();
        let p = *s.decorations().get(id).unwrap().placement();
        let c = p.center();

        s.pointer_pressed(Point::new(c.x, c.y));
        assert_eq!(s.engine().active().map(|a| a.id), Some(id));
        assert!(s.renderer().node(id).unwrap().handles);

        s.pointer_moved(Point::new(c.x, c.y + 10.0));
        s.pointer_released();
        assert_eq!(s.decorations().get(id).unwrap().placement().y, p.y + 10.0);

        // Close handle sits at the rotated top-right corner
        let close = s.renderer().node(id).unwrap().handle_position(HitTarget::Close);
        s.pointer_pressed(close);
        assert!(s.decorations().is_empty());
        assert!(s.engine().active().is_none());
    }

    #[test]
    fn finalize_snapshot_follows_hole_order() {
        let mut s = session(2);
        s.swap(0, 1).unwrap();
        s.set_bg_replacement_without_mask(1, "#ff00ff");
        let snap = s.finalize_snapshot().unwrap();

        assert_eq!(snap.hole_photos, vec![1, 0]);
        let mut model = snap.model.clone();
        assert_eq!(model.compose(snap.hole_photos[0]).unwrap(), s.photos()[1].original);
        assert_eq!(snap.video_paths, vec!["/static/videos/v1.webm", "/static/videos/v0.webm"]);
        // Photo 1 sits in hole 0 and has no mask yet
        assert_eq!(snap.background_colors, Some(vec![Some("#ff00ff".to_string()), None]));
        assert!(matches!(snap.template, TemplateSource::Path(_)));
    }

    impl ReviewSession {
        fn set_bg_replacement_without_mask(&mut self, index: usize, color: &str) {
            self.model.set_bg_replacement(index, true, Some(color.to_string())).unwrap();
        }
    }
}
