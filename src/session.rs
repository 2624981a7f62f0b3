use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use image::{DynamicImage, RgbaImage};
use tracing::debug;

use crate::action::{
    ActionId, ActionStore, Color, DrawingAction, PathHandle, Point, StrokeWidth, DEFAULT_TEXT,
};
use crate::flatten;
use crate::font::FontMetrics;
use crate::input::{PointerEvent, PointerPhase};
use crate::render;
use crate::settings::EditorSettings;
use crate::store::{FolderId, MessageBody, MessageId, MessageRecord, MessageStore};
use crate::text::{TextController, TextGestureKind, TextProxy};
use crate::transform::{Viewport, WHEEL_ZOOM_IN, WHEEL_ZOOM_OUT};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolMode {
    Pan,
    Doodle,
}

#[derive(Clone, Copy, Debug)]
enum ActiveGesture {
    Pan { last: Point },
    Doodle { path: PathHandle },
    Pinch { last_distance: Option<f32> },
}

/// One open annotation-editing session over a note message's image. Owns the
/// action list and the active-text pointer exclusively; nothing else mutates
/// them while the session is open. Dropping the session without `save` is a
/// cancel.
pub struct EditorSession {
    message_id: Option<MessageId>,
    folder_id: FolderId,
    image: DynamicImage,
    source: RgbaImage,
    viewport: Viewport,
    container: (f32, f32),
    store: ActionStore,
    text: TextController,
    metrics: FontMetrics,
    tool: ToolMode,
    gesture: Option<ActiveGesture>,
    active_color: Color,
    active_stroke: StrokeWidth,
    settings: EditorSettings,
}

impl EditorSession {
    /// Re-open a previously saved image message for editing. The stored
    /// action list is copied, so edits stay cancelable.
    pub fn open_record(
        record: &MessageRecord,
        container: (f32, f32),
        metrics: FontMetrics,
        settings: EditorSettings,
    ) -> Result<Self> {
        match &record.body {
            MessageBody::Image {
                image_data,
                drawing_actions,
            } => Self::new(
                Some(record.id),
                record.folder_id,
                image_data,
                drawing_actions.clone(),
                container,
                metrics,
                settings,
            ),
            MessageBody::Text { .. } => Err(anyhow!("message {} has no image", record.id)),
        }
    }

    /// Open a freshly uploaded image that has no message record yet; save
    /// will create one in `folder_id`.
    pub fn open_upload(
        folder_id: FolderId,
        image_data: &str,
        container: (f32, f32),
        metrics: FontMetrics,
        settings: EditorSettings,
    ) -> Result<Self> {
        Self::new(
            None,
            folder_id,
            image_data,
            Vec::new(),
            container,
            metrics,
            settings,
        )
    }

    fn new(
        message_id: Option<MessageId>,
        folder_id: FolderId,
        image_data: &str,
        actions: Vec<DrawingAction>,
        container: (f32, f32),
        metrics: FontMetrics,
        settings: EditorSettings,
    ) -> Result<Self> {
        let image = flatten::decode_data_uri(image_data).context("cannot open image for editing")?;
        let source = image.to_rgba8();
        let viewport = Viewport::fit_to_container(
            (image.width() as f32, image.height() as f32),
            container,
        );
        debug!(
            id = ?message_id,
            width = image.width(),
            height = image.height(),
            actions = actions.len(),
            "editor session opened"
        );
        Ok(Self {
            message_id,
            folder_id,
            image,
            source,
            viewport,
            container,
            store: ActionStore::from_actions(actions),
            text: TextController::default(),
            metrics,
            tool: ToolMode::Pan,
            gesture: None,
            active_color: settings.last_color,
            active_stroke: settings.last_stroke,
            settings,
        })
    }

    pub fn message_id(&self) -> Option<MessageId> {
        self.message_id
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn actions(&self) -> &[DrawingAction] {
        self.store.actions()
    }

    pub fn tool(&self) -> ToolMode {
        self.tool
    }

    pub fn active_text_id(&self) -> Option<ActionId> {
        self.text.active_id()
    }

    pub fn active_color(&self) -> Color {
        self.active_color
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn set_tool(&mut self, tool: ToolMode) {
        self.text.deactivate(&mut self.store, &self.metrics);
        self.gesture = None;
        self.tool = tool;
    }

    pub fn set_color(&mut self, color: Color) {
        self.active_color = color;
        self.settings.last_color = color;
        self.text.set_color(&mut self.store, color);
    }

    pub fn set_stroke(&mut self, stroke: StrokeWidth) {
        self.active_stroke = stroke;
        self.settings.last_stroke = stroke;
    }

    /// Place a new text object at the container center and activate it.
    pub fn add_text(&mut self) -> ActionId {
        self.text.deactivate(&mut self.store, &self.metrics);
        self.gesture = None;
        self.tool = ToolMode::Pan;
        let center = self
            .viewport
            .to_image(Point::new(self.container.0 / 2.0, self.container.1 / 2.0));
        let id = self.store.add_text(
            center,
            DEFAULT_TEXT,
            self.settings.last_font_size,
            self.active_color,
        );
        self.text.activate(&mut self.store, &self.metrics, id);
        id
    }

    /// Live text edit of the active object; no-op when nothing is active.
    pub fn set_active_text(&mut self, text: &str) {
        self.text.set_text(&mut self.store, text);
    }

    pub fn delete_active_text(&mut self) -> bool {
        self.text.remove_active(&mut self.store)
    }

    pub fn text_proxy(&self) -> Option<TextProxy> {
        self.text.proxy(&self.store, &self.viewport, &self.metrics)
    }

    /// Start a move/resize/rotate gesture from one of the proxy's handles.
    pub fn begin_text_gesture(&mut self, kind: TextGestureKind, screen: Point) {
        self.text
            .begin_gesture(&self.store, &self.viewport, kind, screen);
    }

    pub fn handle_pointer(&mut self, event: &PointerEvent) {
        match event.phase {
            PointerPhase::Down => self.pointer_down(event),
            PointerPhase::Move => self.pointer_move(event),
            PointerPhase::Up => self.pointer_up(),
        }
    }

    fn pointer_down(&mut self, event: &PointerEvent) {
        let Some(primary) = event.primary() else {
            return;
        };
        let screen = primary.pos();
        let image_point = self.viewport.to_image(screen);

        // A text object under the pointer takes priority over the tool mode.
        if let Some(hit) = self.store.hit_test_text(image_point).map(|text| text.id) {
            self.tool = ToolMode::Pan;
            self.gesture = None;
            self.text.activate(&mut self.store, &self.metrics, hit);
            return;
        }
        self.text.deactivate(&mut self.store, &self.metrics);

        match self.tool {
            ToolMode::Doodle => {
                let path =
                    self.store
                        .begin_path(self.active_color, self.active_stroke.px(), image_point);
                self.gesture = Some(ActiveGesture::Doodle { path });
            }
            ToolMode::Pan => {
                self.gesture = Some(ActiveGesture::Pan { last: screen });
            }
        }
    }

    fn pointer_move(&mut self, event: &PointerEvent) {
        if self.text.gesture_active() {
            if let Some(primary) = event.primary() {
                self.text
                    .update_gesture(&mut self.store, &self.viewport, primary.pos());
            }
            return;
        }

        if event.pointers.len() >= 2 {
            // Pinch always wins over the tool mode, but never runs while a
            // text object is being edited.
            if self.text.is_active() {
                return;
            }
            self.update_pinch(event);
            return;
        }

        let Some(primary) = event.primary() else {
            return;
        };
        match self.gesture {
            Some(ActiveGesture::Doodle { path }) => {
                self.store
                    .append_point(path, self.viewport.to_image(primary.pos()));
            }
            Some(ActiveGesture::Pan { last }) => {
                let pos = primary.pos();
                self.viewport.pan(pos.x - last.x, pos.y - last.y);
                self.gesture = Some(ActiveGesture::Pan { last: pos });
            }
            Some(ActiveGesture::Pinch { .. }) | None => {}
        }
    }

    fn update_pinch(&mut self, event: &PointerEvent) {
        let (Some(distance), Some(center)) = (event.pinch_distance(), event.pinch_center()) else {
            return;
        };
        let last_distance = match self.gesture {
            Some(ActiveGesture::Pinch { last_distance }) => last_distance,
            _ => None,
        };
        // Two pointers at the same spot give no usable ratio yet.
        if distance <= f32::EPSILON {
            self.gesture = Some(ActiveGesture::Pinch { last_distance });
            return;
        }
        if let Some(previous) = last_distance {
            self.viewport.zoom_at(center, distance / previous);
        }
        self.gesture = Some(ActiveGesture::Pinch {
            last_distance: Some(distance),
        });
    }

    fn pointer_up(&mut self) {
        self.gesture = None;
        self.text.end_gesture();
    }

    pub fn wheel_zoom(&mut self, screen: Point, delta_y: f32) {
        let factor = if delta_y > 0.0 {
            WHEEL_ZOOM_OUT
        } else {
            WHEEL_ZOOM_IN
        };
        self.viewport.zoom_at(screen, factor);
    }

    /// Composite the current scene for display.
    pub fn render(&self) -> Result<RgbaImage> {
        render::render(
            &self.source,
            &self.viewport,
            self.store.actions(),
            self.text.active_id(),
            (
                self.container.0.round().max(1.0) as u32,
                self.container.1.round().max(1.0) as u32,
            ),
            &self.metrics,
        )
    }

    /// Flatten and persist. On a store failure the in-memory action list is
    /// untouched, so the caller may retry.
    pub fn save(&mut self, store: &mut dyn MessageStore) -> Result<MessageId> {
        self.text.deactivate(&mut self.store, &self.metrics);
        self.gesture = None;

        let flattened = flatten::flatten(&self.image, self.store.actions(), &self.metrics)?;
        let image_data = flatten::encode_data_uri(&flattened)?;
        let drawing_actions = self.store.actions().to_vec();
        let timestamp = Utc::now().timestamp_millis();

        let id = match self.message_id {
            Some(id) => {
                let mut record = store
                    .get_message(id)?
                    .ok_or_else(|| anyhow!("message {id} is missing"))?;
                record.body = MessageBody::Image {
                    image_data,
                    drawing_actions,
                };
                record.timestamp = timestamp;
                store.update_message(&record)?;
                id
            }
            None => {
                let id = store.add_message(MessageRecord {
                    id: 0,
                    folder_id: self.folder_id,
                    body: MessageBody::Image {
                        image_data,
                        drawing_actions,
                    },
                    timestamp,
                })?;
                self.message_id = Some(id);
                id
            }
        };
        debug!(id, "editor session saved");
        Ok(id)
    }

    /// Remove the owning message record entirely, bypassing save.
    pub fn delete_message(&mut self, store: &mut dyn MessageStore) -> Result<()> {
        if let Some(id) = self.message_id.take() {
            store.delete_message(id)?;
        }
        Ok(())
    }

    /// Drop any live gesture and commit the active text object. Safe to call
    /// mid-gesture; nothing is persisted.
    pub fn close(&mut self) {
        self.gesture = None;
        self.text.deactivate(&mut self.store, &self.metrics);
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Result};
    use image::{DynamicImage, Rgba, RgbaImage};

    use super::{EditorSession, ToolMode};
    use crate::action::{DrawingAction, Point};
    use crate::flatten::{decode_data_uri, encode_data_uri};
    use crate::font::FontMetrics;
    use crate::input::{PointerEvent, PointerPhase};
    use crate::settings::EditorSettings;
    use crate::store::{
        FolderId, MemoryStore, MessageBody, MessageId, MessageRecord, MessageStore,
    };

    fn blank_uri(width: u32, height: u32) -> String {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            Rgba([255, 255, 255, 255]),
        ));
        encode_data_uri(&image).expect("encode")
    }

    fn open_session(width: u32, height: u32) -> EditorSession {
        EditorSession::open_upload(
            1,
            &blank_uri(width, height),
            (width as f32, height as f32),
            FontMetrics::none(),
            EditorSettings::default(),
        )
        .expect("open")
    }

    fn down(x: f32, y: f32) -> PointerEvent {
        PointerEvent::single(PointerPhase::Down, x, y)
    }

    fn mv(x: f32, y: f32) -> PointerEvent {
        PointerEvent::single(PointerPhase::Move, x, y)
    }

    fn up() -> PointerEvent {
        PointerEvent::single(PointerPhase::Up, 0.0, 0.0)
    }

    #[test]
    fn open_annotate_save_round_trip() {
        let mut session = open_session(100, 100);
        let viewport = *session.viewport();
        assert_eq!(viewport.scale, 1.0);
        assert_eq!(viewport.origin_x, 0.0);
        assert_eq!(viewport.origin_y, 0.0);

        let id = session.add_text();
        session.set_active_text("Hi");
        let text = session
            .actions()
            .iter()
            .find_map(|action| match action {
                DrawingAction::Text(text) if text.id == id => Some(text.clone()),
                _ => None,
            })
            .expect("text action");
        assert_eq!(text.x, 50.0);
        assert_eq!(text.y, 50.0);

        // A doodle stroke keeps the baked output distinct from the source
        // even on hosts without an installed font.
        session.set_tool(ToolMode::Doodle);
        session.handle_pointer(&down(20.0, 20.0));
        session.handle_pointer(&mv(60.0, 60.0));
        session.handle_pointer(&up());

        let mut store = MemoryStore::new();
        store.add_folder("notes", None);
        let message_id = session.save(&mut store).expect("save");

        let record = store.get_message(message_id).unwrap().expect("record");
        let MessageBody::Image {
            image_data,
            drawing_actions,
        } = &record.body
        else {
            panic!("expected image message");
        };
        assert_eq!(drawing_actions.len(), 2);
        let saved_text = drawing_actions
            .iter()
            .find_map(|action| match action {
                DrawingAction::Text(text) => Some(text),
                _ => None,
            })
            .expect("saved text");
        assert_eq!(saved_text.text, "Hi");

        let flat = decode_data_uri(image_data).expect("decode").to_rgba8();
        assert!(flat.pixels().any(|pixel| *pixel != Rgba([255, 255, 255, 255])));

        // Re-opening the saved record restores editable objects.
        let reopened = EditorSession::open_record(
            &record,
            (100.0, 100.0),
            FontMetrics::none(),
            EditorSettings::default(),
        )
        .expect("reopen");
        assert_eq!(reopened.actions().len(), 2);
    }

    #[test]
    fn hit_activation_beats_the_tool_mode() {
        let mut session = open_session(100, 100);
        let id = session.add_text();
        session.set_tool(ToolMode::Doodle);
        assert!(session.active_text_id().is_none());

        session.handle_pointer(&down(50.0, 50.0));
        assert_eq!(session.active_text_id(), Some(id));
        assert_eq!(session.tool(), ToolMode::Pan);
        assert_eq!(session.actions().len(), 1, "no stroke on a text hit");
    }

    #[test]
    fn doodle_strokes_collect_pointer_moves() {
        let mut session = open_session(100, 100);
        session.set_tool(ToolMode::Doodle);
        session.handle_pointer(&down(10.0, 10.0));
        session.handle_pointer(&mv(12.0, 14.0));
        session.handle_pointer(&mv(15.0, 18.0));
        session.handle_pointer(&up());
        // Moves after the stroke ended must not extend it.
        session.handle_pointer(&mv(90.0, 90.0));

        match &session.actions()[0] {
            DrawingAction::Path(path) => {
                assert_eq!(path.points.len(), 3);
                assert_eq!(path.points[0], Point::new(10.0, 10.0));
            }
            other => panic!("expected path, got {other:?}"),
        }
    }

    #[test]
    fn pan_mode_drags_the_viewport() {
        let mut session = open_session(100, 100);
        session.handle_pointer(&down(40.0, 40.0));
        session.handle_pointer(&mv(45.0, 47.0));
        session.handle_pointer(&mv(46.0, 48.0));
        session.handle_pointer(&up());

        assert_eq!(session.viewport().origin_x, 6.0);
        assert_eq!(session.viewport().origin_y, 8.0);
    }

    #[test]
    fn pinch_from_zero_distance_is_a_guarded_no_op() {
        let mut session = open_session(100, 100);

        session.handle_pointer(&PointerEvent::two_finger(
            PointerPhase::Move,
            (40.0, 40.0),
            (40.0, 40.0),
        ));
        assert_eq!(session.viewport().scale, 1.0);

        // First positive distance only seeds the tracker.
        session.handle_pointer(&PointerEvent::two_finger(
            PointerPhase::Move,
            (30.0, 40.0),
            (50.0, 40.0),
        ));
        assert_eq!(session.viewport().scale, 1.0);

        session.handle_pointer(&PointerEvent::two_finger(
            PointerPhase::Move,
            (20.0, 40.0),
            (60.0, 40.0),
        ));
        let viewport = session.viewport();
        assert!((viewport.scale - 2.0).abs() < 1e-4);
        assert!(viewport.scale.is_finite());
        assert!(viewport.origin_x.is_finite() && viewport.origin_y.is_finite());
    }

    #[test]
    fn pinch_is_suppressed_while_text_is_active() {
        let mut session = open_session(100, 100);
        session.add_text();

        for distance in [(30.0, 50.0), (20.0, 60.0), (10.0, 70.0)] {
            session.handle_pointer(&PointerEvent::two_finger(
                PointerPhase::Move,
                (distance.0, 40.0),
                (distance.1, 40.0),
            ));
        }
        assert_eq!(session.viewport().scale, 1.0);
    }

    #[test]
    fn pointer_down_elsewhere_commits_the_active_text() {
        let mut session = open_session(100, 100);
        let id = session.add_text();
        session.handle_pointer(&down(95.0, 95.0));

        assert!(session.active_text_id().is_none());
        let text = session
            .actions()
            .iter()
            .find_map(|action| match action {
                DrawingAction::Text(text) if text.id == id => Some(text),
                _ => None,
            })
            .expect("text survives deactivation");
        assert!(text.width > 0.0);
    }

    #[test]
    fn cancel_never_touches_the_stored_record() {
        let mut store = MemoryStore::new();
        let folder = store.add_folder("notes", None);
        let id = store
            .add_message(MessageRecord {
                id: 0,
                folder_id: folder,
                body: MessageBody::Image {
                    image_data: blank_uri(50, 50),
                    drawing_actions: Vec::new(),
                },
                timestamp: 1,
            })
            .unwrap();

        let loaded = store.get_message(id).unwrap().unwrap();
        let mut session = EditorSession::open_record(
            &loaded,
            (50.0, 50.0),
            FontMetrics::none(),
            EditorSettings::default(),
        )
        .expect("open");
        session.add_text();
        session.set_active_text("scratch");
        session.close();
        drop(session);

        let fresh = store.get_message(id).unwrap().unwrap();
        let MessageBody::Image {
            drawing_actions, ..
        } = &fresh.body
        else {
            panic!("expected image message");
        };
        assert!(drawing_actions.is_empty());
    }

    struct FailingStore;

    impl MessageStore for FailingStore {
        fn add_message(&mut self, _record: MessageRecord) -> Result<MessageId> {
            Err(anyhow!("store rejected the write"))
        }

        fn update_message(&mut self, _record: &MessageRecord) -> Result<()> {
            Err(anyhow!("store rejected the write"))
        }

        fn delete_message(&mut self, _id: MessageId) -> Result<()> {
            Ok(())
        }

        fn get_message(&self, _id: MessageId) -> Result<Option<MessageRecord>> {
            Ok(None)
        }

        fn messages_in_folder(&self, _folder_id: FolderId) -> Result<Vec<MessageRecord>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn failed_save_keeps_the_action_list_for_retry() {
        let mut session = open_session(40, 40);
        session.add_text();
        session.set_active_text("keep me");

        let mut failing = FailingStore;
        assert!(session.save(&mut failing).is_err());
        assert_eq!(session.actions().len(), 1);

        let mut store = MemoryStore::new();
        store.add_folder("notes", None);
        let id = session.save(&mut store).expect("retry succeeds");
        assert!(store.get_message(id).unwrap().is_some());
    }

    #[test]
    fn malformed_image_data_fails_to_open() {
        let result = EditorSession::open_upload(
            1,
            "data:image/png;base64,not-a-png",
            (100.0, 100.0),
            FontMetrics::none(),
            EditorSettings::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn closing_mid_gesture_drops_the_gesture() {
        let mut session = open_session(100, 100);
        session.set_tool(ToolMode::Doodle);
        session.handle_pointer(&down(10.0, 10.0));
        session.close();
        session.handle_pointer(&mv(50.0, 50.0));

        match &session.actions()[0] {
            DrawingAction::Path(path) => assert_eq!(path.points.len(), 1),
            other => panic!("expected path, got {other:?}"),
        }
    }

    #[test]
    fn delete_message_bypasses_save() {
        let mut store = MemoryStore::new();
        let folder = store.add_folder("notes", None);
        let id = store
            .add_message(MessageRecord {
                id: 0,
                folder_id: folder,
                body: MessageBody::Image {
                    image_data: blank_uri(20, 20),
                    drawing_actions: Vec::new(),
                },
                timestamp: 1,
            })
            .unwrap();

        let loaded = store.get_message(id).unwrap().unwrap();
        let mut session = EditorSession::open_record(
            &loaded,
            (20.0, 20.0),
            FontMetrics::none(),
            EditorSettings::default(),
        )
        .expect("open");
        session.delete_message(&mut store).expect("delete");
        assert!(store.get_message(id).unwrap().is_none());
        assert!(session.message_id().is_none());
    }

    #[test]
    fn wheel_zoom_uses_discrete_steps() {
        let mut session = open_session(100, 100);
        session.wheel_zoom(Point::new(50.0, 50.0), -1.0);
        assert!((session.viewport().scale - 1.1).abs() < 1e-5);
        session.wheel_zoom(Point::new(50.0, 50.0), 1.0);
        assert!((session.viewport().scale - 0.99).abs() < 1e-5);
    }
}
