use crate::action::Point;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerSample {
    pub id: u64,
    pub x: f32,
    pub y: f32,
}

impl PointerSample {
    pub fn new(id: u64, x: f32, y: f32) -> Self {
        Self { id, x, y }
    }

    pub fn pos(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// One toolkit-independent input event: the full set of pointers touching
/// the editing surface at `timestamp` (milliseconds, host clock). A pointer
/// leaving the surface is delivered as `Up`.
#[derive(Clone, Debug, PartialEq)]
pub struct PointerEvent {
    pub phase: PointerPhase,
    pub pointers: Vec<PointerSample>,
    pub timestamp: i64,
}

impl PointerEvent {
    pub fn new(phase: PointerPhase, pointers: Vec<PointerSample>, timestamp: i64) -> Self {
        Self {
            phase,
            pointers,
            timestamp,
        }
    }

    pub fn single(phase: PointerPhase, x: f32, y: f32) -> Self {
        Self::new(phase, vec![PointerSample::new(0, x, y)], 0)
    }

    pub fn two_finger(phase: PointerPhase, first: (f32, f32), second: (f32, f32)) -> Self {
        Self::new(
            phase,
            vec![
                PointerSample::new(0, first.0, first.1),
                PointerSample::new(1, second.0, second.1),
            ],
            0,
        )
    }

    pub fn primary(&self) -> Option<&PointerSample> {
        self.pointers.first()
    }

    pub fn pinch_distance(&self) -> Option<f32> {
        match self.pointers.as_slice() {
            [a, b, ..] => Some(a.pos().distance(b.pos())),
            _ => None,
        }
    }

    pub fn pinch_center(&self) -> Option<Point> {
        match self.pointers.as_slice() {
            [a, b, ..] => Some(Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)),
            _ => None,
        }
    }
}
