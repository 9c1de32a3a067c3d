use std::collections::HashMap;

use iced::alignment::{Horizontal, Vertical};
use iced::mouse::{self, Cursor};
use iced::widget::canvas::{self, Frame, Path, Program, Stroke};
use iced::widget::image::Handle;
use iced::{Color, Radians, Rectangle, Renderer, Theme, Vector};

use crate::color;
use crate::geometry::{Point, PreviewScaling, Rect, Size};
use crate::interaction::render::{HitTarget, Node, NodeContent, HANDLE_RADIUS};
use crate::review::ReviewSession;
use crate::state::decoration::Justify;
use crate::Message;

const SELECTION: Color = Color::from_rgb(0.2, 0.55, 1.0);
const GUIDE: Color = Color::from_rgb(1.0, 0.2, 0.6);

/// Pointer input on the preview, in container pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PreviewEvent {
    Pressed { position: Point, container: Size },
    Moved(Point),
    Released,
}

/// Decoded images the preview draws, keyed the way the session addresses them
#[derive(Debug, Default)]
pub struct PreviewImages {
    pub template: Option<Handle>,
    /// Composed photo per photo index, with its natural size
    pub photos: Vec<Option<(Handle, Size)>>,
    /// Sticker images by sticker path
    pub stickers: HashMap<String, Handle>,
}

/// Canvas program for the review preview: photos in their holes, the
/// template, decorations, and the active item's handles and guides
pub struct Preview<'a> {
    pub session: &'a ReviewSession,
    pub images: &'a PreviewImages,
}

/// State for drag interactions
#[derive(Debug, Clone, Default)]
pub struct DragState {
    pub is_dragging: bool,
}

impl Program<Message> for Preview<'_> {
    type State = DragState;

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: Cursor,
    ) -> Vec<canvas::Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        let Some(scaling) = self.session.preview_scaling() else {
            return vec![frame.into_geometry()];
        };

        if self.session.is_inverted() {
            self.draw_template(&mut frame, &scaling);
            self.draw_photos(&mut frame, &scaling);
        } else {
            self.draw_photos(&mut frame, &scaling);
            self.draw_template(&mut frame, &scaling);
        }

        for node in self.session.renderer().nodes() {
            self.draw_node(&mut frame, node);
        }
        self.draw_guides(&mut frame, &scaling);

        vec![frame.into_geometry()]
    }

    fn update(
        &self,
        state: &mut Self::State,
        event: canvas::Event,
        bounds: Rectangle,
        cursor: Cursor,
    ) -> (canvas::event::Status, Option<Message>) {
        match event {
            canvas::Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                if let Some(pos) = cursor.position_in(bounds) {
                    state.is_dragging = true;
                    let event = PreviewEvent::Pressed {
                        position: Point::new(pos.x, pos.y),
                        container: Size::new(bounds.width, bounds.height),
                    };
                    return (canvas::event::Status::Captured, Some(Message::Preview(event)));
                }
            }

            canvas::Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
                if state.is_dragging {
                    state.is_dragging = false;
                    return (canvas::event::Status::Captured, Some(Message::Preview(PreviewEvent::Released)));
                }
            }

            // Drags keep tracking outside the canvas
            canvas::Event::Mouse(mouse::Event::CursorMoved { position }) => {
                if state.is_dragging {
                    let local = Point::new(position.x - bounds.x, position.y - bounds.y);
                    return (canvas::event::Status::Captured, Some(Message::Preview(PreviewEvent::Moved(local))));
                }
            }

            _ => {}
        }

        (canvas::event::Status::Ignored, None)
    }

    fn mouse_interaction(&self, state: &Self::State, bounds: Rectangle, cursor: Cursor) -> mouse::Interaction {
        if state.is_dragging {
            return mouse::Interaction::Grabbing;
        }
        let Some(pos) = cursor.position_in(bounds) else {
            return mouse::Interaction::default();
        };
        match self.session.renderer().hit_test(Point::new(pos.x, pos.y)).map(|h| h.target) {
            Some(HitTarget::Body) => mouse::Interaction::Grab,
            Some(HitTarget::ResizeRotate) => mouse::Interaction::Crosshair,
            Some(HitTarget::Close) => mouse::Interaction::Pointer,
            None => mouse::Interaction::default(),
        }
    }
}

impl Preview<'_> {
    fn draw_template(&self, frame: &mut Frame, scaling: &PreviewScaling) {
        if let Some(handle) = &self.images.template {
            let area = Rectangle::new(
                iced::Point::new(scaling.offset_x, scaling.offset_y),
                iced::Size::new(scaling.rendered_width, scaling.rendered_height),
            );
            frame.draw_image(area, canvas::Image::new(handle.clone()));
        }
    }

    fn draw_photos(&self, frame: &mut Frame, scaling: &PreviewScaling) {
        let Some(template) = self.session.template() else {
            return;
        };
        for (hole_index, hole) in template.info.holes.iter().enumerate() {
            let Some(Some((handle, size))) = self
                .session
                .hole_photo(hole_index)
                .and_then(|index| self.images.photos.get(index))
            else {
                continue;
            };
            let slot = scaling.rect_to_screen(&Rect::new(hole.x, hole.y, hole.w, hole.h));
            let cover = cover_rect(&slot, *size);
            let rotation = template.hole_transform(hole_index).rotation;

            frame.with_clip(to_rectangle(&slot), |f| {
                let local = Rect::new(cover.x - slot.x, cover.y - slot.y, cover.width, cover.height);
                f.draw_image(
                    to_rectangle(&local),
                    canvas::Image::new(handle.clone()).rotation(Radians(rotation.to_radians())),
                );
            });

            if self.session.selected_hole() == Some(hole_index) {
                frame.stroke(
                    &Path::rectangle(iced::Point::new(slot.x, slot.y), iced::Size::new(slot.width, slot.height)),
                    Stroke::default().with_color(SELECTION).with_width(3.0),
                );
            }
        }
    }

    fn draw_node(&self, frame: &mut Frame, node: &Node) {
        let r = &node.rect;
        let center = r.center();

        frame.with_save(|f| {
            f.translate(Vector::new(center.x, center.y));
            f.rotate(Radians(node.rotation.to_radians()));
            let local = iced::Point::new(-r.width / 2.0, -r.height / 2.0);

            match &node.content {
                NodeContent::Sticker { path } => {
                    if let Some(handle) = self.images.stickers.get(path) {
                        f.draw_image(
                            Rectangle::new(local, iced::Size::new(r.width, r.height)),
                            canvas::Image::new(handle.clone()),
                        );
                    }
                }
                NodeContent::Text { text, color: hex, font_size, justify, .. } => {
                    let (x, align) = text_anchor(r.width, *justify);
                    f.fill_text(canvas::Text {
                        content: text.clone(),
                        position: iced::Point::new(x, 0.0),
                        color: to_color(hex),
                        size: (*font_size).into(),
                        horizontal_alignment: align,
                        vertical_alignment: Vertical::Center,
                        ..canvas::Text::default()
                    });
                }
            }

            if node.handles || node.editing {
                f.stroke(
                    &Path::rectangle(local, iced::Size::new(r.width, r.height)),
                    Stroke::default().with_color(SELECTION).with_width(2.0),
                );
            }
        });

        if node.handles {
            for (handle, fill) in [(HitTarget::Close, Color::from_rgb(0.9, 0.2, 0.2)), (HitTarget::ResizeRotate, SELECTION)] {
                let p = node.handle_position(handle);
                frame.fill(&Path::circle(iced::Point::new(p.x, p.y), HANDLE_RADIUS * 0.75), fill);
            }
        }
    }

    fn draw_guides(&self, frame: &mut Frame, scaling: &PreviewScaling) {
        let guides = self.session.engine().guides();
        let stroke = Stroke::default().with_color(GUIDE).with_width(1.0);

        if guides.vertical {
            let x = scaling.center_x();
            frame.stroke(
                &Path::line(
                    iced::Point::new(x, scaling.offset_y),
                    iced::Point::new(x, scaling.offset_y + scaling.rendered_height),
                ),
                stroke,
            );
        }

        let active = self.session.engine().active().and_then(|a| self.session.renderer().node(a.id));
        if let (true, Some(node)) = (guides.horizontal, active) {
            let y = node.rect.center().y;
            frame.stroke(
                &Path::line(
                    iced::Point::new(scaling.offset_x, y),
                    iced::Point::new(scaling.offset_x + scaling.rendered_width, y),
                ),
                stroke,
            );
        }
    }
}

fn to_rectangle(r: &Rect) -> Rectangle {
    Rectangle::new(iced::Point::new(r.x, r.y), iced::Size::new(r.width, r.height))
}

/// Smallest rect of the image's aspect ratio that covers `slot`, centered on it
pub fn cover_rect(slot: &Rect, image: Size) -> Rect {
    if image.width <= 0.0 || image.height <= 0.0 {
        return *slot;
    }
    let scale = (slot.width / image.width).max(slot.height / image.height);
    let (w, h) = (image.width * scale, image.height * scale);
    Rect::new(slot.x + (slot.width - w) / 2.0, slot.y + (slot.height - h) / 2.0, w, h)
}

/// Text x position inside a box centered on the origin, and its alignment
fn text_anchor(width: f32, justify: Justify) -> (f32, Horizontal) {
    match justify {
        Justify::Left => (-width / 2.0, Horizontal::Left),
        Justify::Center => (0.0, Horizontal::Center),
        Justify::Right => (width / 2.0, Horizontal::Right),
    }
}

/// Unparseable colors draw black
fn to_color(hex: &str) -> Color {
    color::parse_hex(hex)
        .map(|c| Color::from_rgba8(c[0], c[1], c[2], c[3] as f32 / 255.0))
        .unwrap_or(Color::BLACK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_fills_a_wide_slot_with_a_tall_image() {
        let slot = Rect::new(10.0, 10.0, 200.0, 100.0);
        let cover = cover_rect(&slot, Size::new(50.0, 100.0));
        assert_eq!(cover.width, 200.0);
        assert_eq!(cover.height, 400.0);
        assert_eq!(cover.x, 10.0);
        assert_eq!(cover.y, 10.0 - 150.0);
    }

    #[test]
    fn text_anchor_follows_justification() {
        assert_eq!(text_anchor(100.0, Justify::Left).0, -50.0);
        assert_eq!(text_anchor(100.0, Justify::Center).0, 0.0);
        assert_eq!(text_anchor(100.0, Justify::Right).0, 50.0);
    }

    #[test]
    fn invalid_text_color_falls_back_to_black() {
        assert_eq!(to_color("nope"), Color::BLACK);
        assert_eq!(to_color("#ff0000"), Color::from_rgb8(255, 0, 0));
    }
}
