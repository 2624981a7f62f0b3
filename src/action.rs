use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};
use tiny_skia::Transform;

use crate::transform::map_point;

pub type ActionId = u64;

pub const DEFAULT_TEXT: &str = "Enter Text";
pub const DEFAULT_FONT_SIZE: f32 = 40.0;
pub const MIN_FONT_SIZE: f32 = 10.0;
pub const DEFAULT_TEXT_WIDTH: f32 = 200.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum StrokeWidth {
    Thin,
    Medium,
    Thick,
}

impl StrokeWidth {
    pub fn px(self) -> f32 {
        match self {
            Self::Thin => 2.5,
            Self::Medium => 5.0,
            Self::Thick => 8.0,
        }
    }
}

impl Default for StrokeWidth {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);

    pub fn rgba(self) -> [u8; 4] {
        self.0
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let rgb = match name {
            "red" => [255, 0, 0],
            "orange" => [255, 165, 0],
            "yellow" => [255, 255, 0],
            "green" => [0, 128, 0],
            "blue" => [0, 0, 255],
            "purple" => [128, 0, 128],
            "black" => [0, 0, 0],
            "white" => [255, 255, 255],
            _ => return None,
        };
        Some(Self([rgb[0], rgb[1], rgb[2], 255]))
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        let byte = |i: usize| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok();
        match digits.len() {
            6 => Some(Self([byte(0)?, byte(2)?, byte(4)?, 255])),
            8 => Some(Self([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
            _ => None,
        }
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::RED
    }
}

impl Serialize for Color {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ColorVisitor;

        impl<'de> Visitor<'de> for ColorVisitor {
            type Value = Color;

            fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                formatter.write_str("an RGBA array or a legacy color name / hex string")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::SeqAccess<'de>,
            {
                let r = seq
                    .next_element::<u8>()?
                    .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
                let g = seq
                    .next_element::<u8>()?
                    .ok_or_else(|| serde::de::Error::invalid_length(1, &self))?;
                let b = seq
                    .next_element::<u8>()?
                    .ok_or_else(|| serde::de::Error::invalid_length(2, &self))?;
                let a = seq.next_element::<u8>()?.unwrap_or(255);
                Ok(Color([r, g, b, a]))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Color::from_name(value)
                    .or_else(|| Color::from_hex(value))
                    .ok_or_else(|| E::custom(format!("unknown color '{value}'")))
            }
        }

        deserializer.deserialize_any(ColorVisitor)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }
}

fn default_text_width() -> f32 {
    DEFAULT_TEXT_WIDTH
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PathAction {
    pub color: Color,
    #[serde(rename = "width")]
    pub stroke_width: f32,
    pub points: Vec<Point>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextAction {
    pub id: ActionId,
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub color: Color,
    pub rotation: f32,
    #[serde(default = "default_text_width")]
    pub width: f32,
}

impl TextAction {
    pub fn anchor(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Local frame → image space: translate to the anchor, then rotate.
    pub fn local_to_image(&self) -> Transform {
        Transform::from_translate(self.x, self.y)
            .pre_concat(Transform::from_rotate(self.rotation.to_degrees()))
    }

    pub fn contains(&self, point: Point) -> bool {
        let Some(to_local) = self.local_to_image().invert() else {
            return false;
        };
        let local = map_point(to_local, point);
        let width = if self.width > 0.0 {
            self.width
        } else {
            DEFAULT_TEXT_WIDTH
        };
        local.x.abs() <= width / 2.0 && local.y.abs() <= self.font_size / 2.0
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DrawingAction {
    Path(PathAction),
    Text(TextAction),
}

/// Index of an open freehand stroke inside an [`ActionStore`]. Only valid for
/// the duration of the stroke gesture that created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathHandle(usize);

#[derive(Clone, Debug)]
pub struct ActionStore {
    actions: Vec<DrawingAction>,
    next_id: ActionId,
}

impl Default for ActionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionStore {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
            next_id: 1,
        }
    }

    pub fn from_actions(actions: Vec<DrawingAction>) -> Self {
        let next_id = actions
            .iter()
            .filter_map(|action| match action {
                DrawingAction::Text(text) => Some(text.id),
                DrawingAction::Path(_) => None,
            })
            .max()
            .map_or(1, |id| id.saturating_add(1));
        Self { actions, next_id }
    }

    pub fn actions(&self) -> &[DrawingAction] {
        &self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    fn next_action_id(&mut self) -> ActionId {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    pub fn begin_path(&mut self, color: Color, stroke_width: f32, start: Point) -> PathHandle {
        self.actions.push(DrawingAction::Path(PathAction {
            color,
            stroke_width,
            points: vec![start],
        }));
        PathHandle(self.actions.len() - 1)
    }

    pub fn append_point(&mut self, handle: PathHandle, point: Point) {
        if let Some(DrawingAction::Path(path)) = self.actions.get_mut(handle.0) {
            path.points.push(point);
        }
    }

    pub fn add_text(&mut self, center: Point, text: &str, font_size: f32, color: Color) -> ActionId {
        let id = self.next_action_id();
        self.actions.push(DrawingAction::Text(TextAction {
            id,
            text: text.to_string(),
            x: center.x,
            y: center.y,
            font_size,
            color,
            rotation: 0.0,
            width: DEFAULT_TEXT_WIDTH,
        }));
        id
    }

    pub fn remove_text(&mut self, id: ActionId) -> bool {
        let before = self.actions.len();
        self.actions.retain(|action| match action {
            DrawingAction::Text(text) => text.id != id,
            DrawingAction::Path(_) => true,
        });
        self.actions.len() != before
    }

    pub fn text(&self, id: ActionId) -> Option<&TextAction> {
        self.actions.iter().find_map(|action| match action {
            DrawingAction::Text(text) if text.id == id => Some(text),
            _ => None,
        })
    }

    pub fn text_mut(&mut self, id: ActionId) -> Option<&mut TextAction> {
        self.actions.iter_mut().find_map(|action| match action {
            DrawingAction::Text(text) if text.id == id => Some(text),
            _ => None,
        })
    }

    /// Topmost text object under `point`, if any. Later actions win; doodle
    /// strokes are never hit-testable.
    pub fn hit_test_text(&self, point: Point) -> Option<&TextAction> {
        self.actions.iter().rev().find_map(|action| match action {
            DrawingAction::Text(text) if text.contains(point) => Some(text),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::{ActionStore, Color, DrawingAction, Point, TextAction, DEFAULT_TEXT_WIDTH};

    fn text_at(id: u64, x: f32, y: f32) -> TextAction {
        TextAction {
            id,
            text: "hello".to_string(),
            x,
            y,
            font_size: 20.0,
            color: Color::RED,
            rotation: 0.0,
            width: 100.0,
        }
    }

    #[test]
    fn open_path_accepts_points_only_through_its_handle() {
        let mut store = ActionStore::new();
        let handle = store.begin_path(Color::RED, 5.0, Point::new(1.0, 1.0));
        store.append_point(handle, Point::new(2.0, 2.0));
        store.add_text(Point::new(0.0, 0.0), "x", 40.0, Color::RED);

        match &store.actions()[0] {
            DrawingAction::Path(path) => assert_eq!(path.points.len(), 2),
            other => panic!("expected path, got {other:?}"),
        }
    }

    #[test]
    fn later_text_wins_overlapping_hit_test() {
        let mut store = ActionStore::new();
        let first = store.add_text(Point::new(50.0, 50.0), "a", 20.0, Color::RED);
        let second = store.add_text(Point::new(50.0, 50.0), "b", 20.0, Color::RED);
        assert_ne!(first, second);

        let hit = store.hit_test_text(Point::new(50.0, 50.0)).expect("hit");
        assert_eq!(hit.id, second);
    }

    #[test]
    fn rotation_moves_the_hit_box() {
        let mut upright = text_at(1, 50.0, 50.0);
        let probe = Point::new(55.0, 90.0);
        assert!(!upright.contains(probe));

        upright.rotation = FRAC_PI_2;
        assert!(upright.contains(probe));
    }

    #[test]
    fn zero_width_falls_back_to_default_bounds() {
        let mut text = text_at(1, 0.0, 0.0);
        text.width = 0.0;
        assert!(text.contains(Point::new(DEFAULT_TEXT_WIDTH / 2.0 - 1.0, 0.0)));
        assert!(!text.contains(Point::new(DEFAULT_TEXT_WIDTH / 2.0 + 1.0, 0.0)));
    }

    #[test]
    fn persisted_form_keeps_original_field_names() {
        let action = DrawingAction::Text(text_at(7, 1.0, 2.0));
        let json = serde_json::to_value(&action).expect("serialize");
        assert_eq!(json["type"], "text");
        assert_eq!(json["fontSize"], 20.0);
        assert_eq!(json["color"], serde_json::json!([255, 0, 0, 255]));

        let path = DrawingAction::Path(super::PathAction {
            color: Color::RED,
            stroke_width: 5.0,
            points: vec![Point::new(0.0, 0.0)],
        });
        let json = serde_json::to_value(&path).expect("serialize");
        assert_eq!(json["type"], "path");
        assert_eq!(json["width"], 5.0);
    }

    #[test]
    fn legacy_records_deserialize() {
        let raw = r#"{
            "type": "text",
            "id": 3,
            "text": "hi",
            "x": 10.0,
            "y": 20.0,
            "fontSize": 40.0,
            "color": "red",
            "rotation": 0.0
        }"#;
        let action: DrawingAction = serde_json::from_str(raw).expect("legacy text");
        match action {
            DrawingAction::Text(text) => {
                assert_eq!(text.color, Color::RED);
                assert_eq!(text.width, DEFAULT_TEXT_WIDTH);
            }
            other => panic!("expected text, got {other:?}"),
        }

        let hex: Color = serde_json::from_str("\"#8000ff\"").expect("hex color");
        assert_eq!(hex, Color([128, 0, 255, 255]));
    }

    #[test]
    fn ids_stay_unique_after_loading_existing_actions() {
        let mut store = ActionStore::from_actions(vec![DrawingAction::Text(text_at(9, 0.0, 0.0))]);
        let id = store.add_text(Point::new(1.0, 1.0), "x", 40.0, Color::RED);
        assert_eq!(id, 10);
        assert!(store.remove_text(9));
        assert!(store.text(9).is_none());
    }
}
