/// Stickers and text boxes placed over the template
///
/// Geometry is stored in the template's natural pixel space. Text boxes
/// derive their width/height from text measurement; stickers keep whatever
/// size the user resized them to.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Size};

/// Stable decoration identity. Also the z-order key: older ids sit below
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct DecorationId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecorationKind {
    Sticker,
    Text,
}

/// Position, size and rotation shared by every decoration
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub id: DecorationId,
    /// Top-left corner before rotation
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Degrees, clockwise
    #[serde(default)]
    pub rotation: f32,
}

impl Placement {
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Move so the center lands on `center`, keeping size
    pub fn recenter(&mut self, center: Point) {
        self.x = center.x - self.width / 2.0;
        self.y = center.y - self.height / 2.0;
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Sticker {
    #[serde(flatten)]
    pub placement: Placement,
    pub path: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Justify {
    Left,
    #[default]
    Center,
    Right,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TextBox {
    #[serde(flatten)]
    pub placement: Placement,
    pub text: String,
    pub font: String,
    pub color: String,
    #[serde(rename = "fontSize")]
    pub font_size: f32,
    #[serde(default)]
    pub justify: Justify,
}

impl TextBox {
    /// Resize the box to fit its content
    pub fn remeasure(&mut self, measurer: &dyn TextMeasurer) {
        let size = measurer.measure(&self.text, &self.font, self.font_size);
        self.placement.width = size.width;
        self.placement.height = size.height;
    }
}

/// Text layout oracle; the UI provides a real one, tests use the estimate
pub trait TextMeasurer {
    fn measure(&self, text: &str, font: &str, font_size: f32) -> Size;
}

/// Monospace-ish estimate: 0.6 em per character, 1.2 em line height
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatedTextMeasurer;

impl TextMeasurer for EstimatedTextMeasurer {
    fn measure(&self, text: &str, _font: &str, font_size: f32) -> Size {
        let lines = text.lines().count().max(1);
        let longest = text.lines().map(|l| l.chars().count()).max().unwrap_or(0).max(1);
        Size::new(longest as f32 * font_size * 0.6, lines as f32 * font_size * 1.2)
    }
}

/// Borrowed view of either decoration kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecorationRef<'a> {
    Sticker(&'a Sticker),
    Text(&'a TextBox),
}

impl<'a> DecorationRef<'a> {
    pub fn placement(&self) -> &'a Placement {
        match self {
            DecorationRef::Sticker(s) => &s.placement,
            DecorationRef::Text(t) => &t.placement,
        }
    }

    pub fn id(&self) -> DecorationId {
        self.placement().id
    }

    pub fn kind(&self) -> DecorationKind {
        match self {
            DecorationRef::Sticker(_) => DecorationKind::Sticker,
            DecorationRef::Text(_) => DecorationKind::Text,
        }
    }
}

#[derive(Debug)]
pub enum DecorationMut<'a> {
    Sticker(&'a mut Sticker),
    Text(&'a mut TextBox),
}

impl DecorationMut<'_> {
    pub fn placement_mut(&mut self) -> &mut Placement {
        match self {
            DecorationMut::Sticker(s) => &mut s.placement,
            DecorationMut::Text(t) => &mut t.placement,
        }
    }
}

/// Partial update from the text editor dialog
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextEdit {
    pub text: Option<String>,
    pub font: Option<String>,
    pub color: Option<String>,
    pub font_size: Option<f32>,
    pub justify: Option<Justify>,
}

/// Clock-based ids that never repeat, even within one millisecond
#[derive(Debug, Default)]
struct IdGenerator {
    last: u64,
}

impl IdGenerator {
    fn next_at(&mut self, now_ms: u64) -> DecorationId {
        self.last = now_ms.max(self.last + 1);
        DecorationId(self.last)
    }

    fn next(&mut self) -> DecorationId {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        self.next_at(now)
    }
}

/// All decorations of the session
#[derive(Debug, Default)]
pub struct DecorationSet {
    stickers: Vec<Sticker>,
    texts: Vec<TextBox>,
    ids: IdGenerator,
}

impl DecorationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stickers(&self) -> &[Sticker] {
        &self.stickers
    }

    pub fn texts(&self) -> &[TextBox] {
        &self.texts
    }

    pub fn len(&self) -> usize {
        self.stickers.len() + self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a sticker `width_ratio` of the template wide, centered on it
    pub fn add_sticker_centered(
        &mut self,
        path: &str,
        sticker_size: Size,
        template_size: Size,
        width_ratio: f32,
    ) -> DecorationId {
        let id = self.ids.next();
        let width = template_size.width * width_ratio;
        let aspect = if sticker_size.width > 0.0 && sticker_size.height > 0.0 {
            sticker_size.aspect_ratio()
        } else {
            1.0
        };
        let height = width / aspect;

        self.stickers.push(Sticker {
            placement: Placement {
                id,
                x: (template_size.width - width) / 2.0,
                y: (template_size.height - height) / 2.0,
                width,
                height,
                rotation: 0.0,
            },
            path: path.to_string(),
        });
        id
    }

    /// Add a text box centered on the template, sized to its content
    pub fn add_text_centered(
        &mut self,
        text: &str,
        font: &str,
        color: &str,
        font_size: f32,
        measurer: &dyn TextMeasurer,
        template_size: Size,
    ) -> DecorationId {
        let id = self.ids.next();
        let size = measurer.measure(text, font, font_size);

        self.texts.push(TextBox {
            placement: Placement {
                id,
                x: (template_size.width - size.width) / 2.0,
                y: (template_size.height - size.height) / 2.0,
                width: size.width,
                height: size.height,
                rotation: 0.0,
            },
            text: text.to_string(),
            font: font.to_string(),
            color: color.to_string(),
            font_size,
            justify: Justify::Center,
        });
        id
    }

    pub fn remove(&mut self, id: DecorationId) -> bool {
        let before = self.len();
        self.stickers.retain(|s| s.placement.id != id);
        self.texts.retain(|t| t.placement.id != id);
        self.len() != before
    }

    pub fn get(&self, id: DecorationId) -> Option<DecorationRef<'_>> {
        if let Some(s) = self.stickers.iter().find(|s| s.placement.id == id) {
            return Some(DecorationRef::Sticker(s));
        }
        self.texts.iter().find(|t| t.placement.id == id).map(DecorationRef::Text)
    }

    pub fn get_mut(&mut self, id: DecorationId) -> Option<DecorationMut<'_>> {
        if let Some(s) = self.stickers.iter_mut().find(|s| s.placement.id == id) {
            return Some(DecorationMut::Sticker(s));
        }
        self.texts.iter_mut().find(|t| t.placement.id == id).map(DecorationMut::Text)
    }

    /// Stickers and texts merged, oldest first
    pub fn ordered(&self) -> Vec<DecorationRef<'_>> {
        let mut all: Vec<DecorationRef<'_>> = self
            .stickers
            .iter()
            .map(DecorationRef::Sticker)
            .chain(self.texts.iter().map(DecorationRef::Text))
            .collect();
        all.sort_by_key(|d| d.id());
        all
    }

    /// Apply an editor result and re-measure; returns false for unknown ids
    pub fn update_text(&mut self, id: DecorationId, edit: TextEdit, measurer: &dyn TextMeasurer) -> bool {
        let Some(text) = self.texts.iter_mut().find(|t| t.placement.id == id) else {
            return false;
        };
        if let Some(v) = edit.text {
            text.text = v;
        }
        if let Some(v) = edit.font {
            text.font = v;
        }
        if let Some(v) = edit.color {
            text.color = v;
        }
        if let Some(v) = edit.font_size {
            text.font_size = v;
        }
        if let Some(v) = edit.justify {
            text.justify = v;
        }
        text.remeasure(measurer);
        true
    }

    pub fn clear(&mut self) {
        self.stickers.clear();
        self.texts.clear();
    }

    #[cfg(test)]
    pub(crate) fn push_sticker_at(&mut self, id: u64, x: f32, y: f32, w: f32, h: f32) -> DecorationId {
        let id = self.ids.next_at(id);
        self.stickers.push(Sticker {
            placement: Placement { id, x, y, width: w, height: h, rotation: 0.0 },
            path: format!("/static/stickers/{}.png", id.0),
        });
        id
    }

    #[cfg(test)]
    pub(crate) fn push_text_at(&mut self, id: u64, text: &str, x: f32, y: f32, font_size: f32) -> DecorationId {
        let id = self.ids.next_at(id);
        let mut text = TextBox {
            placement: Placement { id, x, y, width: 0.0, height: 0.0, rotation: 0.0 },
            text: text.to_string(),
            font: "Arial".to_string(),
            color: "#000000".to_string(),
            font_size,
            justify: Justify::Center,
        };
        text.remeasure(&EstimatedTextMeasurer);
        self.texts.push(text);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: Size = Size { width: 1000.0, height: 1500.0 };

    #[test]
    fn ids_are_unique_within_one_tick() {
        let mut ids = IdGenerator::default();
        let a = ids.next_at(1_000);
        let b = ids.next_at(1_000);
        let c = ids.next_at(999);
        assert_eq!(a, DecorationId(1_000));
        assert_eq!(b, DecorationId(1_001));
        assert_eq!(c, DecorationId(1_002));
    }

    #[test]
    fn sticker_is_centered_at_ratio_width() {
        let mut set = DecorationSet::new();
        let id = set.add_sticker_centered("/s/heart.png", Size::new(200.0, 100.0), TEMPLATE, 0.3);
        let p = *set.get(id).unwrap().placement();
        assert_eq!(p.width, 300.0);
        assert_eq!(p.height, 150.0);
        assert_eq!(p.center(), Point::new(500.0, 750.0));
    }

    #[test]
    fn text_is_measured_on_add_and_edit() {
        let mut set = DecorationSet::new();
        let id = set.add_text_centered("hello", "Arial", "#000", 40.0, &EstimatedTextMeasurer, TEMPLATE);
        let p = *set.get(id).unwrap().placement();
        assert_eq!(p.width, 5.0 * 40.0 * 0.6);
        assert_eq!(p.height, 40.0 * 1.2);

        let edited = set.update_text(
            id,
            TextEdit { text: Some("hi\nthere".into()), font_size: Some(20.0), ..Default::default() },
            &EstimatedTextMeasurer,
        );
        assert!(edited);
        let p = *set.get(id).unwrap().placement();
        assert_eq!(p.width, 5.0 * 20.0 * 0.6);
        assert_eq!(p.height, 2.0 * 20.0 * 1.2);
    }

    #[test]
    fn ordered_merges_by_ascending_id() {
        let mut set = DecorationSet::new();
        set.push_text_at(5, "b", 0.0, 0.0, 30.0);
        set.push_sticker_at(7, 0.0, 0.0, 10.0, 10.0);
        // Generator is already past 7, so this one is newest despite the hint
        let newest = set.push_text_at(1, "c", 0.0, 0.0, 30.0);

        let ids: Vec<_> = set.ordered().iter().map(|d| d.id().0).collect();
        assert_eq!(ids, vec![5, 7, newest.0]);
        assert_eq!(set.ordered()[1].kind(), DecorationKind::Sticker);
    }

    #[test]
    fn remove_and_clear() {
        let mut set = DecorationSet::new();
        let a = set.push_sticker_at(1, 0.0, 0.0, 10.0, 10.0);
        set.push_text_at(2, "x", 0.0, 0.0, 30.0);
        assert!(set.remove(a));
        assert!(!set.remove(a));
        assert_eq!(set.len(), 1);
        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn json_matches_backend_shape() {
        let mut set = DecorationSet::new();
        set.push_text_at(3, "hey", 10.0, 20.0, 40.0);
        let json = serde_json::to_value(&set.texts()[0]).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["fontSize"], 40.0);
        assert_eq!(json["justify"], "center");
        assert_eq!(json["x"], 10.0);

        let sticker: Sticker = serde_json::from_str(
            r#"{"id":9,"path":"/s.png","x":1,"y":2,"width":3,"height":4,"rotation":45}"#,
        )
        .unwrap();
        assert_eq!(sticker.placement.rotation, 45.0);
    }
}
