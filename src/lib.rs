//! Toolkit-independent image annotation editor for note messages: doodle
//! strokes and movable text over a pannable/zoomable view of a source image,
//! flattened back into the owning message record on save.

pub mod action;
pub mod flatten;
pub mod font;
pub mod input;
pub mod render;
pub mod session;
pub mod settings;
pub mod store;
pub mod text;
pub mod transform;

pub use action::{
    ActionId, ActionStore, Color, DrawingAction, PathAction, PathHandle, Point, StrokeWidth,
    TextAction,
};
pub use flatten::{decode_data_uri, encode_data_uri, encode_png, flatten};
pub use font::FontMetrics;
pub use input::{PointerEvent, PointerPhase, PointerSample};
pub use render::render;
pub use session::{EditorSession, ToolMode};
pub use settings::EditorSettings;
pub use store::{
    FolderId, FolderRecord, JsonStore, MemoryStore, MessageBody, MessageId, MessageRecord,
    MessageStore,
};
pub use text::{TextController, TextGestureKind, TextProxy};
pub use transform::Viewport;
