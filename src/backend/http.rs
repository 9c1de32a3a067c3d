/// HTTP client for the composition backend
///
/// All uploads are multipart forms; JSON-typed fields (holes, stickers,
/// filters...) are sent as JSON strings inside the form, the way the
/// service expects them. Each body is first assembled as a plain field
/// list and only turned into a `Form` when sent.

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    Backend, ComposeImageRequest, ComposeResult, ComposeVideoRequest, DeliveryResult,
    SessionRecord, TemplateSource, VideoProgress,
};
use crate::error::{EditorError, EditorResult};
use crate::state::data::{ImageBlob, PaletteColor, StickerAsset, StylePreset, Template};
use crate::state::edit::{BackgroundSettings, FilterValues};

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> EditorResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") || path.starts_with("data:") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post_fields(&self, path: &str, fields: Fields) -> EditorResult<Response> {
        debug!(path, fields = fields.len(), "POST multipart");
        let response = self.client.post(self.url(path)).multipart(into_form(fields)?).send().await?;
        check_status(response).await
    }

    async fn get(&self, path: &str) -> EditorResult<Response> {
        let response = self.client.get(self.url(path)).send().await?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> EditorResult<T> {
        Ok(self.get(path).await?.json().await?)
    }

    async fn blob(response: Response) -> EditorResult<ImageBlob> {
        Ok(ImageBlob::new(response.bytes().await?.to_vec()))
    }
}

/// Turn a non-2xx response into `EditorError::Backend`, reading FastAPI's
/// `{"detail": ...}` body when present
async fn check_status(response: Response) -> EditorResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("detail").map(|d| d.as_str().map(str::to_string).unwrap_or_else(|| d.to_string())))
        .unwrap_or(body);

    warn!(status = status.as_u16(), %detail, "backend request failed");
    Err(EditorError::backend(status.as_u16(), detail))
}

/// One multipart field, before it becomes a reqwest `Part`
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FormValue {
    Text(String),
    File { file_name: String, blob: ImageBlob },
}

pub(crate) type Fields = Vec<(&'static str, FormValue)>;

fn text(value: impl Into<String>) -> FormValue {
    FormValue::Text(value.into())
}

fn file(blob: &ImageBlob, file_name: impl Into<String>) -> FormValue {
    FormValue::File { file_name: file_name.into(), blob: blob.clone() }
}

fn json_field<T: Serialize + ?Sized>(value: &T) -> EditorResult<FormValue> {
    Ok(text(serde_json::to_string(value)?))
}

fn image_part(blob: &ImageBlob, file_name: &str) -> EditorResult<Part> {
    let mime = if file_name.ends_with(".png") { "image/png" } else { "image/jpeg" };
    Ok(Part::bytes(blob.bytes().to_vec())
        .file_name(file_name.to_string())
        .mime_str(mime)?)
}

fn into_form(fields: Fields) -> EditorResult<Form> {
    fields.into_iter().try_fold(Form::new(), |form, (name, value)| {
        Ok(match value {
            FormValue::Text(value) => form.text(name, value),
            FormValue::File { file_name, blob } => form.part(name, image_part(&blob, &file_name)?),
        })
    })
}

/// An unmodified template goes by server path, a recolored one is uploaded
fn template_field(template: &TemplateSource) -> (&'static str, FormValue) {
    match template {
        TemplateSource::Path(path) => ("template_path", text(path.clone())),
        TemplateSource::File(blob) => ("template_file", file(blob, "template.png")),
    }
}

/// Multipart fields for `/compose_image`. `video_paths` travels as one JSON
/// array here.
pub(crate) fn compose_image_fields(request: &ComposeImageRequest) -> EditorResult<Fields> {
    let mut fields = vec![
        ("holes", json_field(&request.holes)?),
        ("stickers", json_field(&request.stickers)?),
        ("texts", json_field(&request.texts)?),
        ("filters", json_field(&request.filters)?),
        ("transformations", json_field(&request.transformations)?),
        ("is_inverted", text(request.is_inverted.to_string())),
        template_field(&request.template),
    ];

    if let Some(colors) = &request.background_colors {
        fields.push(("background_colors", json_field(colors)?));
    }
    if !request.video_paths.is_empty() {
        fields.push(("video_paths", json_field(&request.video_paths)?));
    }
    for (i, photo) in request.photos.iter().enumerate() {
        fields.push(("photos", file(photo, format!("photo_{i}.png"))));
    }
    Ok(fields)
}

/// Multipart fields for `/compose_video`. Here `video_paths` is a repeated
/// plain field, one per clip.
pub(crate) fn compose_video_fields(request: &ComposeVideoRequest) -> EditorResult<Fields> {
    let mut fields = vec![
        ("session_id", text(request.session_id.clone())),
        ("holes", json_field(&request.holes)?),
        ("stickers", json_field(&request.stickers)?),
        ("texts", json_field(&request.texts)?),
        ("transformations", json_field(&request.transformations)?),
        ("is_inverted", text(request.is_inverted.to_string())),
        template_field(&request.template),
    ];
    fields.extend(request.video_paths.iter().map(|path| ("video_paths", text(path.clone()))));
    Ok(fields)
}

impl Backend for HttpBackend {
    async fn stylize(&self, prompt: &str, photo: &ImageBlob) -> EditorResult<ImageBlob> {
        let fields = vec![("prompt", text(prompt)), ("file", file(photo, "photo.jpg"))];
        Self::blob(self.post_fields("/process_and_stylize_image", fields).await?).await
    }

    async fn apply_filters(&self, photo: &ImageBlob, filters: &FilterValues) -> EditorResult<ImageBlob> {
        let fields = vec![("file", file(photo, "photo.png")), ("filters", text(filters.to_json()?))];
        Self::blob(self.post_fields("/apply_filters_to_image", fields).await?).await
    }

    async fn remove_background(
        &self,
        photo: &ImageBlob,
        settings: &BackgroundSettings,
    ) -> EditorResult<ImageBlob> {
        let fields = vec![
            ("file", file(photo, "photo.png")),
            ("threshold", text(settings.threshold.to_string())),
            ("bg_threshold", text(settings.bg_threshold.to_string())),
            ("erode_size", text(settings.erode_size.to_string())),
        ];
        Self::blob(self.post_fields("/remove_background", fields).await?).await
    }

    async fn compose_image(&self, request: &ComposeImageRequest) -> EditorResult<ComposeResult> {
        let fields = compose_image_fields(request)?;
        Ok(self.post_fields("/compose_image", fields).await?.json().await?)
    }

    async fn compose_video(&self, request: &ComposeVideoRequest) -> EditorResult<DeliveryResult> {
        let fields = compose_video_fields(request)?;
        Ok(self.post_fields("/compose_video", fields).await?.json().await?)
    }

    async fn video_progress(&self, session_id: &str) -> EditorResult<VideoProgress> {
        self.get_json(&format!("/video_progress/{session_id}")).await
    }

    async fn zip_photos(&self, photos: &[(String, ImageBlob)]) -> EditorResult<DeliveryResult> {
        let fields = photos.iter().map(|(name, blob)| ("photos", file(blob, name.clone()))).collect();
        Ok(self.post_fields("/zip_originals", fields).await?.json().await?)
    }

    async fn fetch_session(&self, session_id: &str) -> EditorResult<SessionRecord> {
        self.get_json(&format!("/session/{session_id}")).await
    }

    async fn fetch_asset(&self, path: &str) -> EditorResult<ImageBlob> {
        Self::blob(self.get(path).await?).await
    }

    async fn list_stickers(&self) -> EditorResult<Vec<StickerAsset>> {
        self.get_json("/stickers").await
    }

    async fn list_styles(&self) -> EditorResult<Vec<StylePreset>> {
        self.get_json("/styles").await
    }

    async fn list_colors(&self) -> EditorResult<Vec<PaletteColor>> {
        self.get_json("/colors").await
    }

    async fn list_templates_by_layout(
        &self,
        aspect_ratio: &str,
        cell_layout: &str,
    ) -> EditorResult<Vec<Template>> {
        let response = self
            .client
            .get(self.url("/templates_by_layout"))
            .query(&[("aspect_ratio", aspect_ratio), ("cell_layout", cell_layout)])
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::{Hole, HoleTransform};

    fn backend() -> HttpBackend {
        HttpBackend::new("http://booth.local:8000/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn urls_join_without_double_slash() {
        let b = backend();
        assert_eq!(b.url("/compose_image"), "http://booth.local:8000/compose_image");
        assert_eq!(b.url("static/x.png"), "http://booth.local:8000/static/x.png");
        assert_eq!(b.url("https://cdn/x.png"), "https://cdn/x.png");
    }

    #[test]
    fn image_parts_pick_mime_from_name() {
        let blob = ImageBlob::new(vec![1u8, 2, 3]);
        assert!(image_part(&blob, "template.png").is_ok());
        assert!(image_part(&blob, "photo_0.jpg").is_ok());
    }

    fn image_request() -> ComposeImageRequest {
        ComposeImageRequest {
            template: TemplateSource::Path("/static/templates/strip.png".into()),
            holes: vec![Hole { x: 0.0, y: 0.0, w: 10.0, h: 10.0 }; 2],
            stickers: Vec::new(),
            texts: Vec::new(),
            filters: FilterValues::default(),
            transformations: vec![HoleTransform::default(); 2],
            background_colors: None,
            video_paths: Vec::new(),
            is_inverted: true,
            photos: vec![ImageBlob::new(vec![1u8]), ImageBlob::new(vec![2u8])],
        }
    }

    fn names(fields: &Fields) -> Vec<&'static str> {
        fields.iter().map(|(name, _)| *name).collect()
    }

    fn values<'a>(fields: &'a Fields, name: &str) -> Vec<&'a FormValue> {
        fields.iter().filter(|(n, _)| *n == name).map(|(_, v)| v).collect()
    }

    #[test]
    fn compose_image_omits_absent_optional_fields() {
        let fields = compose_image_fields(&image_request()).unwrap();

        assert!(!names(&fields).contains(&"background_colors"));
        assert!(!names(&fields).contains(&"video_paths"));
        assert!(!names(&fields).contains(&"template_file"));
        assert_eq!(values(&fields, "template_path"), vec![&text("/static/templates/strip.png")]);
        assert_eq!(values(&fields, "is_inverted"), vec![&text("true")]);
        assert_eq!(
            values(&fields, "photos"),
            vec![
                &file(&ImageBlob::new(vec![1u8]), "photo_0.png"),
                &file(&ImageBlob::new(vec![2u8]), "photo_1.png"),
            ]
        );
    }

    #[test]
    fn compose_image_sends_colors_videos_and_uploaded_template() {
        let template = ImageBlob::new(vec![7u8]);
        let request = ComposeImageRequest {
            template: TemplateSource::File(template.clone()),
            background_colors: Some(vec![Some("#ff00ff".into()), None]),
            video_paths: vec!["/v0.webm".into(), "/v1.webm".into()],
            ..image_request()
        };
        let fields = compose_image_fields(&request).unwrap();

        assert!(!names(&fields).contains(&"template_path"));
        assert_eq!(values(&fields, "template_file"), vec![&file(&template, "template.png")]);
        assert_eq!(values(&fields, "background_colors"), vec![&text(r##"["#ff00ff",null]"##)]);
        // One JSON array, not a repeated field
        assert_eq!(values(&fields, "video_paths"), vec![&text(r#"["/v0.webm","/v1.webm"]"#)]);
        assert!(into_form(fields).is_ok());
    }

    #[test]
    fn compose_video_repeats_video_paths() {
        let request = ComposeVideoRequest {
            session_id: "s1".into(),
            template: TemplateSource::Path("/t.png".into()),
            holes: Vec::new(),
            stickers: Vec::new(),
            texts: Vec::new(),
            transformations: Vec::new(),
            is_inverted: false,
            video_paths: vec!["/v0.webm".into(), "/v1.webm".into()],
        };
        let fields = compose_video_fields(&request).unwrap();

        assert_eq!(fields[0], ("session_id", text("s1")));
        assert_eq!(values(&fields, "video_paths"), vec![&text("/v0.webm"), &text("/v1.webm")]);
        assert_eq!(values(&fields, "template_path"), vec![&text("/t.png")]);
        assert!(!names(&fields).contains(&"filters"));
    }
}
