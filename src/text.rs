use crate::action::{ActionId, ActionStore, Color, Point, MIN_FONT_SIZE};
use crate::font::FontMetrics;
use crate::transform::Viewport;

/// Padding added to the measured image-space width cached for hit-testing.
pub const HIT_WIDTH_PADDING: f32 = 20.0;
/// Padding and height factor of the on-screen editing proxy.
pub const PROXY_WIDTH_PADDING: f32 = 30.0;
pub const PROXY_HEIGHT_FACTOR: f32 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextGestureKind {
    Move,
    Resize,
    Rotate,
}

#[derive(Clone, Copy, Debug)]
struct TextGesture {
    kind: TextGestureKind,
    start: Point,
    last: Point,
    start_font_size: f32,
    start_offset: f32,
}

/// Screen-space layout for the host's live text-editing overlay. While a
/// text object is active the renderer suppresses it and the host shows this
/// proxy instead.
#[derive(Clone, Debug, PartialEq)]
pub struct TextProxy {
    pub screen: Point,
    pub width: f32,
    pub height: f32,
    pub font_px: f32,
    pub rotation: f32,
    pub color: Color,
    pub text: String,
}

/// State machine over the single active text object: activation, live text
/// edits, move/resize/rotate gestures, and width recompute on deactivation.
#[derive(Clone, Debug, Default)]
pub struct TextController {
    active: Option<ActionId>,
    gesture: Option<TextGesture>,
}

impl TextController {
    pub fn active_id(&self) -> Option<ActionId> {
        self.active
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn gesture_active(&self) -> bool {
        self.gesture.is_some()
    }

    pub fn activate(&mut self, store: &mut ActionStore, metrics: &FontMetrics, id: ActionId) {
        if self.active == Some(id) {
            return;
        }
        self.deactivate(store, metrics);
        if store.text(id).is_some() {
            self.active = Some(id);
        }
    }

    /// Commit the active object: recompute its cached hit-test width from the
    /// final text at the image-space font size, then let it bake again.
    pub fn deactivate(&mut self, store: &mut ActionStore, metrics: &FontMetrics) {
        self.gesture = None;
        let Some(id) = self.active.take() else {
            return;
        };
        if let Some(text) = store.text_mut(id) {
            text.width = metrics.measure(&text.text, text.font_size) + HIT_WIDTH_PADDING;
        }
    }

    /// Delete the active object without baking it.
    pub fn remove_active(&mut self, store: &mut ActionStore) -> bool {
        self.gesture = None;
        match self.active.take() {
            Some(id) => store.remove_text(id),
            None => false,
        }
    }

    pub fn set_text(&self, store: &mut ActionStore, text: &str) {
        if let Some(target) = self.active.and_then(|id| store.text_mut(id)) {
            target.text = text.to_string();
        }
    }

    pub fn set_color(&self, store: &mut ActionStore, color: Color) {
        if let Some(target) = self.active.and_then(|id| store.text_mut(id)) {
            target.color = color;
        }
    }

    pub fn begin_gesture(
        &mut self,
        store: &ActionStore,
        viewport: &Viewport,
        kind: TextGestureKind,
        screen: Point,
    ) {
        let Some(text) = self.active.and_then(|id| store.text(id)) else {
            return;
        };
        // Capture the angular offset at grab time so rotation does not jump.
        let start_offset = match kind {
            TextGestureKind::Rotate => {
                let anchor = viewport.to_screen(text.anchor());
                (screen.y - anchor.y).atan2(screen.x - anchor.x) - text.rotation
            }
            _ => 0.0,
        };
        self.gesture = Some(TextGesture {
            kind,
            start: screen,
            last: screen,
            start_font_size: text.font_size,
            start_offset,
        });
    }

    pub fn update_gesture(&mut self, store: &mut ActionStore, viewport: &Viewport, screen: Point) {
        let Some(gesture) = self.gesture.as_mut() else {
            return;
        };
        let Some(text) = self.active.and_then(|id| store.text_mut(id)) else {
            return;
        };
        match gesture.kind {
            TextGestureKind::Move => {
                text.x += (screen.x - gesture.last.x) / viewport.scale;
                text.y += (screen.y - gesture.last.y) / viewport.scale;
                gesture.last = screen;
            }
            TextGestureKind::Resize => {
                let dx = screen.x - gesture.start.x;
                let dy = screen.y - gesture.start.y;
                let distance = (dx * dx + dy * dy).sqrt() * if dx > 0.0 { 1.0 } else { -1.0 };
                text.font_size =
                    (gesture.start_font_size + distance / viewport.scale).max(MIN_FONT_SIZE);
            }
            TextGestureKind::Rotate => {
                let anchor = viewport.to_screen(text.anchor());
                let angle = (screen.y - anchor.y).atan2(screen.x - anchor.x);
                text.rotation = angle - gesture.start_offset;
            }
        }
    }

    pub fn end_gesture(&mut self) {
        self.gesture = None;
    }

    pub fn proxy(
        &self,
        store: &ActionStore,
        viewport: &Viewport,
        metrics: &FontMetrics,
    ) -> Option<TextProxy> {
        let text = self.active.and_then(|id| store.text(id))?;
        let font_px = text.font_size * viewport.scale;
        Some(TextProxy {
            screen: viewport.to_screen(text.anchor()),
            width: metrics.measure(&text.text, font_px) + PROXY_WIDTH_PADDING,
            height: font_px * PROXY_HEIGHT_FACTOR,
            font_px,
            rotation: text.rotation,
            color: text.color,
            text: text.text.clone(),
        })
    }
}
