use iced::widget::image::Handle;
use iced::widget::{
    button, canvas, column, container, horizontal_space, image, row, scrollable, slider, text, text_input,
    Column, Row,
};
use iced::{Alignment, Element, Length, Subscription, Task, Theme};
use iced_aw::Wrap;
use rfd::FileDialog;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod backend;
mod color;
mod config;
mod delivery;
mod error;
mod geometry;
mod interaction;
mod media;
mod review;
mod state;
mod ui;

use backend::{Backend, ComposeResult, DeliveryResult, HttpBackend, VideoProgress};
use config::AppConfig;
use delivery::{DeliveryState, FinalizeSnapshot, QrKind, VideoState, VideoTicket};
use error::{EditorError, EditorResult};
use geometry::{Rect, Size};
use interaction::transformable::ActiveSelection;
use media::import::{ImportReport, ImportedPhoto};
use review::{BackgroundJob, ColorTarget, Panel, ReviewSession, StylizeJob};
use state::bus::{AppEvent, Screen, ToastLevel};
use state::data::{ActiveTemplate, ImageBlob, PaletteColor, StickerAsset, StylePreset, Template};
use state::decoration::{DecorationId, DecorationKind, Justify, TextEdit};
use state::edit::FilterPatch;
use state::library::{Library, SessionEntry};
use state::modal::ModalTicket;
use ui::preview::{Preview, PreviewEvent, PreviewImages};

/// Fixed on-screen size of the review preview
const PREVIEW_SIZE: Size = Size { width: 480.0, height: 640.0 };

/// Sessions listed on the import screen
const RECENT_SESSIONS: usize = 8;

/// Backend results travel through messages, which must be `Clone`
type Shared<T> = Result<T, Arc<EditorError>>;

fn share<T>(result: EditorResult<T>) -> Shared<T> {
    result.map_err(Arc::new)
}

/// Static galleries fetched once at startup
#[derive(Debug, Clone, Default)]
struct Gallery {
    stickers: Vec<StickerAsset>,
    styles: Vec<StylePreset>,
    colors: Vec<PaletteColor>,
}

/// Crop dialog: the crop shrinks around the initial rect as zoom grows
#[derive(Debug, Clone)]
struct CropDraft {
    ticket: ModalTicket,
    initial: Rect,
    image_size: Size,
    zoom: f32,
    aspect_ratio: f32,
    image: Handle,
}

impl CropDraft {
    fn rect(&self) -> Rect {
        let (w, h) = (self.initial.width / self.zoom, self.initial.height / self.zoom);
        let c = self.initial.center();
        Rect::new(c.x - w / 2.0, c.y - h / 2.0, w, h).clamp_to(self.image_size.width, self.image_size.height)
    }
}

#[derive(Debug, Clone)]
struct TextDraft {
    ticket: ModalTicket,
    edit: TextEdit,
}

/// Main application state
struct PhotoboothEditor {
    config: AppConfig,
    backend: Arc<HttpBackend>,
    /// Recent-sessions catalog; the app runs without it if it can't be opened
    library: Option<Library>,
    screen: Screen,
    toast: Option<(ToastLevel, String)>,

    imported: Vec<ImportedPhoto>,
    importing: bool,
    session_input: String,
    recent: Vec<SessionEntry>,
    gallery: Gallery,

    review: ReviewSession,
    images: PreviewImages,
    thumbnails: Vec<Option<Handle>>,
    thumbnail_generation: u64,
    templates: Vec<Template>,
    prompt: String,
    crop: Option<CropDraft>,
    text: Option<TextDraft>,
    color_ticket: Option<ModalTicket>,
    color_input: String,
    finalizing: bool,
    snapshot: Option<FinalizeSnapshot>,

    delivery: Option<DeliveryState>,
    result_image: Option<Handle>,
    qr_image: Option<Handle>,
}

/// Application messages (events)
#[derive(Debug, Clone)]
enum Message {
    // import screen
    PickFolder,
    FolderImported(ImportReport),
    AspectRatioChanged(String),
    CellLayoutChanged(String),
    StartReview,
    TemplateLoaded(Shared<ActiveTemplate>),
    GalleryLoaded(Shared<Gallery>),
    SessionInputChanged(String),
    OpenSession(String),
    SessionOpened(Shared<DeliveryState>),

    // review screen
    Preview(PreviewEvent),
    TogglePhoto(usize),
    SelectHole(usize),
    MovePhoto(usize, isize),
    OpenPanel(Panel),
    ClosePanels,
    PromptChanged(String),
    Stylize { prompt: String, style_id: Option<String> },
    Stylized(StylizeJob, Shared<ImageBlob>),
    ResetStyle,
    RemoveBackground,
    BackgroundRemoved(BackgroundJob, Shared<ImageBlob>),
    DisableBackground,
    OpenCrop,
    CropZoom(f32),
    ApplyCrop,
    CancelCrop,
    RemoveCrop,
    Filter(FilterPatch),
    TemplatesListed(Shared<Vec<Template>>),
    ChangeTemplate(usize),
    TemplateSwitched(Shared<ActiveTemplate>),
    OpenColor(ColorTarget),
    ColorInputChanged(String),
    PickColor(String),
    CancelColor,
    ToggleInverted,
    AddSticker(String),
    StickerLoaded(String, Shared<ImageBlob>),
    AddText,
    EditText(DecorationId),
    TextChanged(String),
    TextSizeChanged(f32),
    TextJustify(Justify),
    ConfirmText,
    CancelText,
    DeleteDecoration(DecorationId),
    ThumbnailReady(u64, usize, Shared<PathBuf>),
    Finalize,
    Finalized(Shared<ComposeResult>),

    // result screen
    ResultAsset(Shared<ImageBlob>),
    ComposeVideo,
    VideoProgressTick,
    VideoProgressed(Shared<VideoProgress>),
    VideoComposed(VideoTicket, Shared<DeliveryResult>),
    ZipOriginals,
    ZipGenerated,
    Zipped(QrKind, Shared<DeliveryResult>),
    ShowQr(QrKind),
    QrLoaded(Shared<ImageBlob>),
    Download(QrKind),
    Downloaded(Shared<PathBuf>),
    ContinueEditing,
    GoHome,
    DismissToast,
}

impl PhotoboothEditor {
    /// Create a new instance of the application
    fn new(config: AppConfig, backend: HttpBackend) -> (Self, Task<Message>) {
        let library = match Library::new() {
            Ok(library) => Some(library),
            Err(e) => {
                warn!(error = %e, "session catalog unavailable");
                None
            }
        };
        let recent = library
            .as_ref()
            .and_then(|l| l.recent_sessions(RECENT_SESSIONS).ok())
            .unwrap_or_default();
        if let Some(library) = &library {
            info!(
                catalog = %library.path().display(),
                sessions = library.session_count().unwrap_or_default(),
                "session catalog opened"
            );
        }
        info!(backend = %config.backend_url, recent = recent.len(), "photobooth editor initialized");

        let backend = Arc::new(backend);
        let gallery = {
            let backend = backend.clone();
            Task::perform(async move { share(load_gallery(backend.as_ref()).await) }, Message::GalleryLoaded)
        };

        let app = Self {
            review: ReviewSession::new(config.clone()),
            config,
            backend,
            library,
            screen: Screen::Import,
            toast: None,
            imported: Vec::new(),
            importing: false,
            session_input: String::new(),
            recent,
            gallery: Gallery::default(),
            images: PreviewImages::default(),
            thumbnails: Vec::new(),
            thumbnail_generation: 0,
            templates: Vec::new(),
            prompt: String::new(),
            crop: None,
            text: None,
            color_ticket: None,
            color_input: String::new(),
            finalizing: false,
            snapshot: None,
            delivery: None,
            result_image: None,
            qr_image: None,
        };
        (app, gallery)
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        let task = self.handle(message);
        let events = self.review.drain_events();
        Task::batch([task, self.apply_events(events)])
    }

    fn handle(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::PickFolder => {
                let folder = FileDialog::new().set_title("Select Folder with Photos").pick_folder();
                if let Some(folder) = folder {
                    self.importing = true;
                    self.toast(ToastLevel::Info, format!("Importing from {}...", folder.display()));
                    return Task::perform(media::import::import_folder(folder), Message::FolderImported);
                }
            }
            Message::FolderImported(report) => {
                self.importing = false;
                self.toast(
                    ToastLevel::Info,
                    format!("Imported {} photos, skipped {}.", report.photos.len(), report.skipped),
                );
                self.imported = report.photos;
            }
            Message::AspectRatioChanged(value) => self.config.aspect_ratio = value,
            Message::CellLayoutChanged(value) => self.config.cell_layout = value,
            Message::StartReview => {
                if self.imported.is_empty() {
                    self.toast(ToastLevel::Error, "Import photos first.");
                    return Task::none();
                }
                let backend = self.backend.clone();
                let (aspect, layout) = (self.config.aspect_ratio.clone(), self.config.cell_layout.clone());
                return Task::perform(
                    async move { share(media::import::load_template(backend.as_ref(), &aspect, &layout).await) },
                    Message::TemplateLoaded,
                );
            }
            Message::TemplateLoaded(result) => match result {
                Ok(template) => return self.start_review(template),
                Err(e) => self.fail("Loading the template failed", &e),
            },
            Message::GalleryLoaded(result) => match result {
                Ok(gallery) => self.gallery = gallery,
                Err(e) => warn!(error = %e, "gallery unavailable"),
            },
            Message::SessionInputChanged(value) => self.session_input = value,
            Message::OpenSession(id) => {
                let backend = self.backend.clone();
                return Task::perform(
                    async move { share(delivery::replay_session(backend.as_ref(), &id).await) },
                    Message::SessionOpened,
                );
            }
            Message::SessionOpened(result) => match result {
                Ok(state) => return self.show_result(state),
                Err(e) => self.fail("Session not found", &e),
            },

            Message::Preview(event) => match event {
                PreviewEvent::Pressed { position, container } => {
                    self.review.set_container(container);
                    self.review.pointer_pressed(position);
                }
                PreviewEvent::Moved(position) => {
                    self.review.pointer_moved(position);
                }
                PreviewEvent::Released => self.review.pointer_released(),
            },
            Message::TogglePhoto(index) => {
                let result = self.review.toggle_photo_selection(index);
                self.report(result);
            }
            Message::SelectHole(hole) => {
                let result = self.review.select_hole(hole);
                self.report(result);
            }
            Message::MovePhoto(index, direction) => {
                let result = self.review.move_photo(index, direction);
                self.report(result);
            }
            Message::OpenPanel(panel) => {
                self.review.open_panel(panel);
                if panel == Panel::Templates && self.templates.is_empty() {
                    return self.list_templates();
                }
            }
            Message::ClosePanels => self.review.close_panels(),
            Message::PromptChanged(prompt) => self.prompt = prompt,
            Message::Stylize { prompt, style_id } => {
                let result = self.review.begin_stylize(&prompt, style_id.as_deref());
                if let Some(jobs) = self.report(result) {
                    return Task::batch(jobs.into_iter().map(|job| self.stylize(job)));
                }
            }
            Message::Stylized(job, result) => self.review.complete_stylize(job, result),
            Message::ResetStyle => {
                if let Some(index) = self.focused() {
                    let result = self.review.reset_style(index);
                    self.report(result);
                }
            }
            Message::RemoveBackground => {
                if let Some(index) = self.focused() {
                    let result = self.review.begin_background_removal(index, None);
                    if let Some(job) = self.report(result) {
                        return self.remove_background(job);
                    }
                }
            }
            Message::BackgroundRemoved(job, result) => self.review.complete_background_removal(job, result),
            Message::DisableBackground => {
                if let Some(index) = self.focused() {
                    let result = self.review.disable_background(index);
                    self.report(result);
                }
            }
            Message::OpenCrop => {
                if let Some(index) = self.focused() {
                    let result = self.review.begin_crop(index).and_then(|ticket| self.crop_draft(ticket));
                    self.crop = self.report(result);
                }
            }
            Message::CropZoom(zoom) => {
                if let Some(draft) = &mut self.crop {
                    draft.zoom = zoom;
                }
            }
            Message::ApplyCrop => {
                if let Some(draft) = self.crop.take() {
                    let result = self.review.apply_crop(draft.ticket, Some(draft.rect()));
                    self.report(result);
                }
            }
            Message::CancelCrop => {
                if let Some(draft) = self.crop.take() {
                    let result = self.review.apply_crop(draft.ticket, None);
                    self.report(result);
                }
            }
            Message::RemoveCrop => {
                if let Some(index) = self.focused() {
                    let result = self.review.remove_crop(index);
                    self.report(result);
                }
            }
            Message::Filter(patch) => {
                let result = self.review.set_filters(&patch);
                self.report(result);
            }
            Message::TemplatesListed(result) => match result {
                Ok(templates) => self.templates = templates,
                Err(e) => self.fail("Loading templates failed", &e),
            },
            Message::ChangeTemplate(index) => {
                if let Some(info) = self.templates.get(index).cloned() {
                    let backend = self.backend.clone();
                    return Task::perform(
                        async move { share(media::import::activate_template(backend.as_ref(), info).await) },
                        Message::TemplateSwitched,
                    );
                }
            }
            Message::TemplateSwitched(result) => match result {
                Ok(template) => {
                    let handle = handle_of(template.display_image());
                    let changed = self.review.change_template(template);
                    if self.report(changed).is_some() {
                        self.images.template = Some(handle);
                    }
                }
                Err(e) => self.fail("Loading the template failed", &e),
            },
            Message::OpenColor(target) => {
                let result = self.review.begin_color(target);
                self.color_ticket = self.report(result);
            }
            Message::ColorInputChanged(value) => self.color_input = value,
            Message::PickColor(hex) => {
                if let Some(ticket) = self.color_ticket.take() {
                    let result = self.review.finish_color(ticket, Some(hex));
                    self.refresh_template_image();
                    if let Some(Some(job)) = self.report(result) {
                        return self.remove_background(job);
                    }
                }
            }
            Message::CancelColor => {
                if let Some(ticket) = self.color_ticket.take() {
                    let result = self.review.finish_color(ticket, None);
                    self.report(result);
                }
            }
            Message::ToggleInverted => self.review.toggle_inverted(),
            Message::AddSticker(path) => {
                let backend = self.backend.clone();
                return Task::perform(
                    async move {
                        let result = share(backend.fetch_asset(&path).await);
                        (path, result)
                    },
                    |(path, result)| Message::StickerLoaded(path, result),
                );
            }
            Message::StickerLoaded(path, result) => {
                let added = result
                    .map_err(|e| e.to_string())
                    .and_then(|blob| blob.dimensions().map(|size| (blob, size)).map_err(|e| e.to_string()))
                    .and_then(|(blob, size)| {
                        self.review.add_sticker(&path, size).map(|_| blob).map_err(|e| e.to_string())
                    });
                match added {
                    Ok(blob) => {
                        self.images.stickers.insert(path, handle_of(&blob));
                    }
                    Err(e) => {
                        warn!(path = %path, error = %e, "sticker unavailable");
                        self.toast(ToastLevel::Error, "Adding the sticker failed.");
                    }
                }
            }
            Message::AddText => {
                let result = self.review.begin_add_text();
                self.text = self.report(result).map(|ticket| self.text_draft(ticket));
            }
            Message::EditText(id) => {
                let result = self.review.begin_edit_text(id);
                self.text = self.report(result).map(|ticket| self.text_draft(ticket));
            }
            Message::TextChanged(value) => {
                if let Some(draft) = &mut self.text {
                    draft.edit.text = Some(value);
                }
            }
            Message::TextSizeChanged(size) => {
                if let Some(draft) = &mut self.text {
                    draft.edit.font_size = Some(size);
                }
            }
            Message::TextJustify(justify) => {
                if let Some(draft) = &mut self.text {
                    draft.edit.justify = Some(justify);
                }
            }
            Message::ConfirmText => {
                if let Some(draft) = self.text.take() {
                    let result = self.review.finish_text(draft.ticket, Some(draft.edit));
                    self.report(result);
                }
            }
            Message::CancelText => {
                if let Some(draft) = self.text.take() {
                    let result = self.review.finish_text(draft.ticket, None);
                    self.report(result);
                }
            }
            Message::DeleteDecoration(id) => {
                self.review.delete_decoration(id);
            }
            Message::ThumbnailReady(generation, index, result) => {
                if generation != self.thumbnail_generation {
                    return Task::none();
                }
                match result {
                    Ok(path) => {
                        if let Some(slot) = self.thumbnails.get_mut(index) {
                            *slot = Some(Handle::from_path(path));
                        }
                    }
                    Err(e) => debug!(index, error = %e, "thumbnail failed"),
                }
            }
            Message::Finalize => {
                if self.finalizing {
                    return Task::none();
                }
                let result = self.review.finalize_snapshot();
                if let Some(snapshot) = self.report(result) {
                    self.finalizing = true;
                    self.snapshot = Some(snapshot.clone());
                    let backend = self.backend.clone();
                    return Task::perform(
                        async move { share(delivery::finalize(backend.as_ref(), &snapshot).await) },
                        Message::Finalized,
                    );
                }
            }
            Message::Finalized(result) => {
                self.finalizing = false;
                match (result, self.snapshot.take()) {
                    (Ok(composed), Some(snapshot)) => {
                        if let Some(library) = &self.library {
                            if let Err(e) = library.record_session(&composed) {
                                warn!(error = %e, "could not record session");
                            }
                        }
                        self.refresh_recent();
                        return self.show_result(DeliveryState::from_finalize(composed, &snapshot));
                    }
                    (Err(e), _) => {
                        warn!(error = %e, "finalize failed");
                        self.review.finalize_failed(&e);
                    }
                    (Ok(_), None) => warn!("finalize result without a snapshot"),
                }
            }

            Message::ResultAsset(result) => match result {
                Ok(blob) => self.result_image = Some(handle_of(&blob)),
                Err(e) => warn!(error = %e, "result image unavailable"),
            },
            Message::ComposeVideo => {
                let Some(delivery) = &mut self.delivery else {
                    return Task::none();
                };
                if !delivery.has_videos() {
                    self.toast(ToastLevel::Error, "This session has no videos.");
                    return Task::none();
                }
                if let Some(ticket) = delivery.video.start() {
                    let request = delivery.video_request().clone();
                    let backend = self.backend.clone();
                    return Task::perform(
                        async move { share(delivery::compose_video(backend.as_ref(), &request).await) },
                        move |result| Message::VideoComposed(ticket, result),
                    );
                }
                if delivery.video.result().is_some() {
                    return self.show_qr(QrKind::Video);
                }
            }
            Message::VideoProgressTick => {
                if let Some(delivery) = &self.delivery {
                    let session_id = delivery.session_id().to_string();
                    let backend = self.backend.clone();
                    return Task::perform(
                        async move { share(backend.video_progress(&session_id).await) },
                        Message::VideoProgressed,
                    );
                }
            }
            Message::VideoProgressed(result) => match (result, &mut self.delivery) {
                (Ok(progress), Some(delivery)) => delivery.video.on_progress(progress),
                (Err(e), _) => debug!(error = %e, "progress poll failed"),
                _ => {}
            },
            Message::VideoComposed(ticket, result) => {
                let Some(delivery) = &mut self.delivery else {
                    return Task::none();
                };
                match delivery.video.finish(ticket, result) {
                    Ok(Some(video)) => {
                        if let Some(library) = &self.library {
                            if let Err(e) = library.set_video(delivery.session_id(), &video) {
                                warn!(error = %e, "could not record video");
                            }
                        }
                        return self.show_qr(QrKind::Video);
                    }
                    Ok(None) => {}
                    Err(e) => self.fail("Creating the video failed", &e),
                }
            }
            Message::ZipOriginals => {
                let entries = delivery::originals_entries(self.review.originals());
                return self.zip(QrKind::Originals, entries);
            }
            Message::ZipGenerated => {
                let entries = delivery::generated_entries(self.review.stylized());
                return self.zip(QrKind::Generated, entries);
            }
            Message::Zipped(kind, result) => match result {
                Ok(zip) => {
                    if let Some(delivery) = &mut self.delivery {
                        match kind {
                            QrKind::Generated => delivery.generated_zip = Some(zip),
                            _ => delivery.originals_zip = Some(zip),
                        }
                    }
                    return self.show_qr(kind);
                }
                Err(e) => self.fail("Creating the zip failed", &e),
            },
            Message::ShowQr(kind) => return self.show_qr(kind),
            Message::QrLoaded(result) => match result {
                Ok(blob) => self.qr_image = Some(handle_of(&blob)),
                Err(e) => warn!(error = %e, "QR code unavailable"),
            },
            Message::Download(kind) => {
                let Some(path) = self.delivery.as_ref().and_then(|d| d.result_path(kind)) else {
                    return Task::none();
                };
                let path = path.to_string();
                let backend = self.backend.clone();
                return Task::perform(
                    async move { share(delivery::save_download(backend.as_ref(), &path, kind.file_name()).await) },
                    Message::Downloaded,
                );
            }
            Message::Downloaded(result) => match result {
                Ok(path) => self.toast(ToastLevel::Info, format!("Saved to {}", path.display())),
                Err(e) => self.fail("Download failed", &e),
            },
            Message::ContinueEditing => {
                if let Some(delivery) = &mut self.delivery {
                    delivery.leave();
                }
                self.qr_image = None;
                if self.review.photos().is_empty() {
                    self.screen = Screen::Import;
                } else {
                    self.review.continue_editing();
                }
            }
            Message::GoHome => {
                self.delivery = None;
                self.result_image = None;
                self.qr_image = None;
                self.screen = Screen::Import;
            }
            Message::DismissToast => self.toast = None,
        }
        Task::none()
    }

    /// Turn session events into screen switches, toasts and redraws
    fn apply_events(&mut self, events: Vec<AppEvent>) -> Task<Message> {
        let mut tasks = Vec::new();
        for event in events {
            match event {
                AppEvent::Toast { level, message } => self.toast(level, message),
                AppEvent::ScreenChanged(screen) => self.screen = screen,
                AppEvent::PreviewInvalidated { index } => {
                    self.refresh_preview(index);
                    tasks.push(self.thumbnail(index));
                }
                AppEvent::ThumbnailsInvalidated => {
                    self.thumbnail_generation += 1;
                    let count = self.review.photos().len();
                    self.thumbnails = vec![None; count];
                    self.images.photos = vec![None; count];
                    for index in 0..count {
                        self.refresh_preview(index);
                        tasks.push(self.thumbnail(index));
                    }
                }
                AppEvent::SelectionChanged(id) => debug!(?id, "selection changed"),
                AppEvent::FinalizeFailed(message) => {
                    self.finalizing = false;
                    self.toast(ToastLevel::Error, format!("Finalizing failed: {message}"));
                }
            }
        }
        Task::batch(tasks)
    }

    fn start_review(&mut self, template: ActiveTemplate) -> Task<Message> {
        let holes = template.info.holes.len();
        if self.imported.len() < holes {
            self.toast(
                ToastLevel::Error,
                format!("This layout needs {holes} photos, only {} imported.", self.imported.len()),
            );
            return Task::none();
        }
        let shots = self
            .imported
            .iter()
            .take(holes)
            .map(|p| (p.blob.clone(), p.video.as_ref().map(|v| v.to_string_lossy().to_string())))
            .collect();

        let handle = handle_of(template.display_image());
        let started = self.review.start(shots, template);
        if self.report(started).is_some() {
            self.review.set_container(PREVIEW_SIZE);
            self.images.template = Some(handle);
            self.images.stickers.clear();
            self.templates.clear();
            self.prompt.clear();
            self.crop = None;
            self.text = None;
            self.color_ticket = None;
            self.delivery = None;
        }
        Task::none()
    }

    fn show_result(&mut self, state: DeliveryState) -> Task<Message> {
        let path = state.image.result_path.clone();
        self.delivery = Some(state);
        self.result_image = None;
        self.qr_image = None;
        self.screen = Screen::Result;
        let backend = self.backend.clone();
        Task::perform(async move { share(backend.fetch_asset(&path).await) }, Message::ResultAsset)
    }

    fn show_qr(&mut self, kind: QrKind) -> Task<Message> {
        let Some(delivery) = &mut self.delivery else {
            return Task::none();
        };
        delivery.show_qr(kind);
        let Some(path) = delivery.qr_path(kind).map(str::to_string) else {
            return Task::none();
        };
        self.qr_image = None;
        let backend = self.backend.clone();
        Task::perform(async move { share(backend.fetch_asset(&path).await) }, Message::QrLoaded)
    }

    fn zip(&mut self, kind: QrKind, entries: Vec<(String, ImageBlob)>) -> Task<Message> {
        let cached = self.delivery.as_ref().is_some_and(|d| d.qr_path(kind).is_some());
        if cached {
            return self.show_qr(kind);
        }
        let backend = self.backend.clone();
        Task::perform(
            async move { share(delivery::zip_photos(backend.as_ref(), &entries).await) },
            move |result| Message::Zipped(kind, result),
        )
    }

    fn stylize(&self, job: StylizeJob) -> Task<Message> {
        let backend = self.backend.clone();
        Task::perform(
            async move {
                let result = share(backend.stylize(&job.prompt, &job.image).await);
                (job, result)
            },
            |(job, result)| Message::Stylized(job, result),
        )
    }

    fn remove_background(&self, job: BackgroundJob) -> Task<Message> {
        let backend = self.backend.clone();
        Task::perform(
            async move {
                let result = share(backend.remove_background(&job.image, &job.settings).await);
                (job, result)
            },
            |(job, result)| Message::BackgroundRemoved(job, result),
        )
    }

    fn list_templates(&self) -> Task<Message> {
        let backend = self.backend.clone();
        let (aspect, layout) = (self.config.aspect_ratio.clone(), self.config.cell_layout.clone());
        Task::perform(
            async move { share(backend.list_templates_by_layout(&aspect, &layout).await) },
            Message::TemplatesListed,
        )
    }

    fn thumbnail(&mut self, index: usize) -> Task<Message> {
        let Ok(blob) = self.review.preview(index) else {
            return Task::none();
        };
        let generation = self.thumbnail_generation;
        Task::perform(media::thumbnail::thumbnail(blob), move |result| {
            Message::ThumbnailReady(generation, index, share(result))
        })
    }

    fn refresh_preview(&mut self, index: usize) {
        let preview = self.review.preview(index).and_then(|blob| {
            let size = blob.dimensions()?;
            Ok((handle_of(&blob), size))
        });
        match preview {
            Ok(preview) => {
                if self.images.photos.len() <= index {
                    self.images.photos.resize(index + 1, None);
                }
                self.images.photos[index] = Some(preview);
            }
            Err(e) => warn!(index, error = %e, "preview unavailable"),
        }
    }

    fn refresh_template_image(&mut self) {
        if let Some(template) = self.review.template() {
            self.images.template = Some(handle_of(template.display_image()));
        }
    }

    fn refresh_recent(&mut self) {
        if let Some(library) = &self.library {
            match library.recent_sessions(RECENT_SESSIONS) {
                Ok(recent) => self.recent = recent,
                Err(e) => warn!(error = %e, "could not list sessions"),
            }
        }
    }

    fn crop_draft(&self, ticket: ModalTicket) -> EditorResult<CropDraft> {
        let request = self
            .review
            .crop_dialog
            .request()
            .ok_or_else(|| EditorError::not_ready("crop dialog closed"))?;
        Ok(CropDraft {
            ticket,
            initial: request.initial,
            image_size: request.image.dimensions()?,
            zoom: 1.0,
            aspect_ratio: request.aspect_ratio,
            image: handle_of(&request.image),
        })
    }

    fn text_draft(&self, ticket: ModalTicket) -> TextDraft {
        let edit = self.review.text_dialog.request().map(|r| r.current.clone()).unwrap_or_default();
        TextDraft { ticket, edit }
    }

    /// The photo per-photo tools act on: the first selected one
    fn focused(&self) -> Option<usize> {
        self.review.selected().first().copied()
    }

    fn active(&self) -> Option<ActiveSelection> {
        self.review.engine().active()
    }

    fn toast(&mut self, level: ToastLevel, message: impl Into<String>) {
        self.toast = Some((level, message.into()));
    }

    fn fail(&mut self, what: &str, error: &EditorError) {
        warn!(error = %error, transient = error.is_transient(), "{what}");
        let retry = if error.is_transient() { " Please try again." } else { "" };
        self.toast(ToastLevel::Error, format!("{what}: {error}.{retry}"));
    }

    /// Surface an error as a toast and keep going
    fn report<T>(&mut self, result: EditorResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.fail("Action failed", &e);
                None
            }
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<'_, Message> {
        let body = match self.screen {
            Screen::Import => self.view_import(),
            Screen::Review => self.view_review(),
            Screen::Result => self.view_result(),
        };

        let mut content = Column::new().spacing(10).padding(20);
        if let Some((level, message)) = &self.toast {
            let label = match level {
                ToastLevel::Info => text(message.clone()),
                ToastLevel::Error => text(format!("⚠ {message}")),
            };
            content = content.push(
                row![label, horizontal_space(), button("×").on_press(Message::DismissToast)].align_y(Alignment::Center),
            );
        }
        content = content.push(body);

        container(content).width(Length::Fill).height(Length::Fill).into()
    }

    fn view_import(&self) -> Element<'_, Message> {
        let recent = self.recent.iter().fold(Column::new().spacing(4), |col, entry| {
            col.push(
                button(text(format!("{}  {}", entry.created_at.format("%Y-%m-%d %H:%M"), entry.session_id)))
                    .on_press(Message::OpenSession(entry.session_id.clone())),
            )
        });

        let photos = self.imported.iter().fold(Column::new().spacing(2), |col, photo| {
            let name = photo.path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            let clip = if photo.video.is_some() { " + clip" } else { "" };
            col.push(text(format!("{name}  {:.0}×{:.0}{clip}", photo.size.width, photo.size.height)).size(12))
        });

        let start = button("Start Review").padding(10);
        let start = if self.imported.is_empty() || self.importing { start } else { start.on_press(Message::StartReview) };

        column![
            text("Photobooth Editor").size(48),
            row![
                button("Import Folder").on_press(Message::PickFolder).padding(10),
                text(format!("{} photos ready", self.imported.len())),
            ]
            .spacing(20)
            .align_y(Alignment::Center),
            row![
                text_input("aspect ratio", &self.config.aspect_ratio).on_input(Message::AspectRatioChanged).width(120),
                text_input("cell layout", &self.config.cell_layout).on_input(Message::CellLayoutChanged).width(120),
                start,
            ]
            .spacing(10),
            scrollable(photos).height(Length::Fixed(120.0)),
            text("Open a previous session").size(20),
            row![
                text_input("session id", &self.session_input)
                    .on_input(Message::SessionInputChanged)
                    .on_submit(Message::OpenSession(self.session_input.clone())),
                button("Open").on_press(Message::OpenSession(self.session_input.clone())),
            ]
            .spacing(10),
            scrollable(recent).height(Length::Fill),
        ]
        .spacing(20)
        .align_x(Alignment::Center)
        .into()
    }

    fn view_review(&self) -> Element<'_, Message> {
        let tabs = [
            (Panel::Photos, "Photos"),
            (Panel::Styles, "Styles"),
            (Panel::Filters, "Filters"),
            (Panel::Stickers, "Stickers"),
            (Panel::Templates, "Templates"),
            (Panel::Backgrounds, "Backgrounds"),
        ]
        .into_iter()
        .fold(Row::new().spacing(6), |r, (panel, label)| {
            r.push(button(label).on_press(if self.review.panel() == Some(panel) {
                Message::ClosePanels
            } else {
                Message::OpenPanel(panel)
            }))
        });

        let mut tools = Row::new().spacing(6).push(button("Add Text").on_press(Message::AddText));
        if let Some(active) = self.active() {
            if active.kind == DecorationKind::Text {
                tools = tools.push(button("Edit Text").on_press(Message::EditText(active.id)));
            }
            tools = tools.push(button("Delete").on_press(Message::DeleteDecoration(active.id)));
        }
        tools = tools
            .push(button(if self.review.is_inverted() { "Photos on top" } else { "Template on top" }).on_press(Message::ToggleInverted))
            .push(button("Template Color").on_press(Message::OpenColor(ColorTarget::Template)));
        let finalize = button(if self.finalizing { "Finalizing..." } else { "Finalize" }).padding(10);
        tools = tools.push(horizontal_space()).push(if self.finalizing {
            finalize
        } else {
            finalize.on_press(Message::Finalize)
        });

        let preview = canvas(Preview { session: &self.review, images: &self.images })
            .width(Length::Fixed(PREVIEW_SIZE.width))
            .height(Length::Fixed(PREVIEW_SIZE.height));

        let side: Element<Message> = if let Some(draft) = &self.crop {
            self.view_crop(draft)
        } else if let Some(draft) = &self.text {
            self.view_text(draft)
        } else if self.review.color_dialog.is_open() {
            self.view_color()
        } else {
            self.view_panel()
        };

        column![
            tabs,
            tools,
            row![preview, scrollable(side).width(Length::Fill)].spacing(20),
            self.view_strip(),
        ]
        .spacing(12)
        .into()
    }

    /// Thumbnail strip: click to select, arrows to reorder
    fn view_strip(&self) -> Element<'_, Message> {
        let count = self.review.photos().len();
        let strip = (0..count).fold(Row::new().spacing(8), |r, index| {
            let thumb: Element<Message> = match self.thumbnails.get(index).and_then(Option::as_ref) {
                Some(handle) => image(handle.clone()).width(96).into(),
                None => text(format!("#{}", index + 1)).into(),
            };
            let selected = self.review.selected().contains(&index);
            let loading = self.review.is_loading(index);
            let label = match (selected, loading) {
                (_, true) => "…",
                (true, false) => "✓",
                _ => " ",
            };
            r.push(column![
                button(thumb).on_press(Message::TogglePhoto(index)),
                row![
                    button("<").on_press(Message::MovePhoto(index, -1)),
                    text(label),
                    button(">").on_press(Message::MovePhoto(index, 1)),
                ]
                .spacing(4)
                .align_y(Alignment::Center),
            ])
        });
        scrollable(strip).direction(scrollable::Direction::Horizontal(scrollable::Scrollbar::default())).into()
    }

    fn view_panel(&self) -> Element<'_, Message> {
        let focused = self.focused();
        match self.review.panel() {
            None => text("Select a photo below, or drag stickers and text on the preview.").into(),
            Some(Panel::Photos) => {
                let holes = self.review.template().map_or(0, |t| t.info.holes.len());
                let buttons = (0..holes).fold(Row::new().spacing(6), |r, hole| {
                    let label = match self.review.hole_photo(hole) {
                        Some(index) => format!("Hole {} · #{}", hole + 1, index + 1),
                        None => format!("Hole {}", hole + 1),
                    };
                    r.push(button(text(label)).on_press(Message::SelectHole(hole)))
                });
                let crop = row![
                    button("Crop").on_press_maybe(focused.map(|_| Message::OpenCrop)),
                    button("Remove Crop").on_press_maybe(focused.map(|_| Message::RemoveCrop)),
                ]
                .spacing(6);
                column![text("Pick a photo, then a hole to swap it in."), buttons, crop].spacing(10).into()
            }
            Some(Panel::Styles) => {
                let presets: Vec<Element<Message>> = self
                    .gallery
                    .styles
                    .iter()
                    .map(|style| {
                        button(text(style.name.clone()))
                            .on_press(Message::Stylize { prompt: style.prompt.clone(), style_id: Some(style.id.clone()) })
                            .into()
                    })
                    .collect();
                column![
                    text_input("Describe a style", &self.prompt).on_input(Message::PromptChanged),
                    row![
                        button("Apply").on_press(Message::Stylize { prompt: self.prompt.clone(), style_id: None }),
                        button("Reset Style").on_press_maybe(focused.map(|_| Message::ResetStyle)),
                    ]
                    .spacing(6),
                    Wrap::with_elements(presets).spacing(6.0).line_spacing(6.0),
                ]
                .spacing(10)
                .into()
            }
            Some(Panel::Filters) => {
                let (shown, f) = self.review.shown_filters();
                let description = self.review.model().filter_string(shown).unwrap_or_else(|_| "none".to_string());
                let sliders: [(&str, f32, std::ops::RangeInclusive<f32>, fn(f32) -> FilterPatch); 7] = [
                    ("Brightness", f.brightness, 0.0..=200.0, |v| FilterPatch { brightness: Some(v), ..Default::default() }),
                    ("Contrast", f.contrast, 0.0..=200.0, |v| FilterPatch { contrast: Some(v), ..Default::default() }),
                    ("Saturation", f.saturate, 0.0..=200.0, |v| FilterPatch { saturate: Some(v), ..Default::default() }),
                    ("Blur", f.blur, 0.0..=10.0, |v| FilterPatch { blur: Some(v), ..Default::default() }),
                    ("Warmth", f.warmth, 50.0..=150.0, |v| FilterPatch { warmth: Some(v), ..Default::default() }),
                    ("Sharpness", f.sharpness, 0.0..=100.0, |v| FilterPatch { sharpness: Some(v), ..Default::default() }),
                    ("Grain", f.grain, 0.0..=100.0, |v| FilterPatch { grain: Some(v), ..Default::default() }),
                ];
                let scope = if self.review.selected().is_empty() { "all photos" } else { "selected photos" };
                let header = column![
                    text(format!("Applies to {scope}; baked in when finalizing.")),
                    text(format!("Photo #{}: {description}", shown + 1)).size(12),
                ]
                .spacing(4);
                sliders
                    .into_iter()
                    .fold(column![header].spacing(8), |col, (label, value, range, patch)| {
                        col.push(row![text(label).width(100), slider(range, value, move |v| Message::Filter(patch(v)))].spacing(10))
                    })
                    .into()
            }
            Some(Panel::Stickers) => {
                let stickers: Vec<Element<Message>> = self
                    .gallery
                    .stickers
                    .iter()
                    .map(|s| {
                        let name = s.sticker_path.rsplit('/').next().unwrap_or(&s.sticker_path).to_string();
                        button(text(name)).on_press(Message::AddSticker(s.sticker_path.clone())).into()
                    })
                    .collect();
                Wrap::with_elements(stickers).spacing(6.0).line_spacing(6.0).into()
            }
            Some(Panel::Templates) => self
                .templates
                .iter()
                .enumerate()
                .fold(Column::new().spacing(6), |col, (i, t)| {
                    let name = t.template_path.rsplit('/').next().unwrap_or(&t.template_path).to_string();
                    col.push(button(text(name)).on_press(Message::ChangeTemplate(i)))
                })
                .into(),
            Some(Panel::Backgrounds) => {
                let photo = focused.and_then(|i| self.review.photos().get(i)).map(|p| p.id);
                column![
                    text("Background of the selected photo"),
                    row![
                        button("Remove").on_press_maybe(photo.map(|_| Message::RemoveBackground)),
                        button("Restore").on_press_maybe(photo.map(|_| Message::DisableBackground)),
                        button("Color").on_press_maybe(photo.map(|id| Message::OpenColor(ColorTarget::Background(id)))),
                    ]
                    .spacing(6),
                ]
                .spacing(10)
                .into()
            }
        }
    }

    fn view_crop(&self, draft: &CropDraft) -> Element<'_, Message> {
        let r = draft.rect();
        column![
            text("Crop").size(24),
            image(draft.image.clone()).width(320),
            text(format!("{:.0} × {:.0} at ({:.0}, {:.0}), hole ratio {:.2}", r.width, r.height, r.x, r.y, draft.aspect_ratio)),
            slider(1.0..=4.0, draft.zoom, Message::CropZoom).step(0.05),
            row![button("Apply").on_press(Message::ApplyCrop), button("Cancel").on_press(Message::CancelCrop)].spacing(6),
        ]
        .spacing(10)
        .into()
    }

    fn view_text(&self, draft: &TextDraft) -> Element<'_, Message> {
        let value = draft.edit.text.clone().unwrap_or_default();
        let size = draft.edit.font_size.unwrap_or(self.config.default_text_size);
        let justify = [(Justify::Left, "Left"), (Justify::Center, "Center"), (Justify::Right, "Right")]
            .into_iter()
            .fold(Row::new().spacing(6), |r, (j, label)| r.push(button(label).on_press(Message::TextJustify(j))));
        column![
            text("Text").size(24),
            text_input("Your text", &value).on_input(Message::TextChanged).on_submit(Message::ConfirmText),
            row![text(format!("Size {size:.0}")), slider(self.config.min_font_size..=200.0, size, Message::TextSizeChanged)].spacing(10),
            justify,
            row![button("OK").on_press(Message::ConfirmText), button("Cancel").on_press(Message::CancelText)].spacing(6),
        ]
        .spacing(10)
        .into()
    }

    fn view_color(&self) -> Element<'_, Message> {
        let swatches: Vec<Element<Message>> = self
            .gallery
            .colors
            .iter()
            .map(|c| button(text(c.hex_code.clone())).on_press(Message::PickColor(c.hex_code.clone())).into())
            .collect();
        let valid = color::parse_hex(&self.color_input).is_ok();
        column![
            text("Color").size(24),
            Wrap::with_elements(swatches).spacing(6.0).line_spacing(6.0),
            row![
                text_input("#rrggbb", &self.color_input).on_input(Message::ColorInputChanged),
                button("Use").on_press_maybe(valid.then(|| Message::PickColor(self.color_input.clone()))),
                button("Cancel").on_press(Message::CancelColor),
            ]
            .spacing(6),
        ]
        .spacing(10)
        .into()
    }

    fn view_result(&self) -> Element<'_, Message> {
        let Some(delivery) = &self.delivery else {
            return text("No result").into();
        };

        let result: Element<Message> = match &self.result_image {
            Some(handle) => image(handle.clone()).height(Length::Fixed(PREVIEW_SIZE.height)).into(),
            None => text("Loading result...").into(),
        };

        let video_label = match delivery.video.state() {
            VideoState::Idle => "Create Video".to_string(),
            VideoState::Composing { percent } => format!("Creating video... {percent}%"),
            VideoState::Ready(_) => "Video QR".to_string(),
        };
        let video_busy = matches!(delivery.video.state(), VideoState::Composing { .. });

        let mut actions = column![
            text(format!("Session {}", delivery.session_id())),
            button("Image QR").on_press(Message::ShowQr(QrKind::Image)),
            button(text(video_label)).on_press_maybe((delivery.has_videos() && !video_busy).then_some(Message::ComposeVideo)),
            button("Original Photos QR").on_press(Message::ZipOriginals),
            button("Generated Photos QR").on_press(Message::ZipGenerated),
        ]
        .spacing(8);

        for kind in [QrKind::Image, QrKind::Video, QrKind::Originals, QrKind::Generated] {
            if delivery.result_path(kind).is_some() {
                actions = actions.push(button(text(format!("Save {}", kind.file_name()))).on_press(Message::Download(kind)));
            }
        }

        if delivery.shown_qr.is_some() {
            actions = actions.push(match &self.qr_image {
                Some(handle) => Element::from(image(handle.clone()).width(200)),
                None => text("Loading QR code...").into(),
            });
        }

        actions = actions.push(
            row![button("Continue Editing").on_press(Message::ContinueEditing), button("Home").on_press(Message::GoHome)].spacing(6),
        );

        row![result, actions].spacing(20).into()
    }

    /// Progress polling runs only while a video is being composed
    fn subscription(&self) -> Subscription<Message> {
        match &self.delivery {
            Some(delivery) if delivery.video.is_polling() => {
                iced::time::every(self.config.video_poll_interval()).map(|_| Message::VideoProgressTick)
            }
            _ => Subscription::none(),
        }
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

async fn load_gallery<B: Backend>(backend: &B) -> EditorResult<Gallery> {
    Ok(Gallery {
        stickers: backend.list_stickers().await?,
        styles: backend.list_styles().await?,
        colors: backend.list_colors().await?,
    })
}

fn handle_of(blob: &ImageBlob) -> Handle {
    Handle::from_bytes(blob.bytes().to_vec())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("photobooth_editor=info")),
        )
        .init();

    let config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "config unreadable, using defaults");
        AppConfig::default()
    });
    let backend = HttpBackend::new(&config.backend_url, config.request_timeout())?;

    iced::application("Photobooth Editor", PhotoboothEditor::update, PhotoboothEditor::view)
        .subscription(PhotoboothEditor::subscription)
        .theme(PhotoboothEditor::theme)
        .centered()
        .run_with(move || PhotoboothEditor::new(config, backend))?;
    Ok(())
}
