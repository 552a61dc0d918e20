//! Structured edit commands
//!
//! A chat editor may answer with a command instead of a whole layout. The
//! command is resolved against the current layout into an `UpdateSet` and
//! goes through Layout Merge like any generator output.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::model::{BoundingBox, Layout, ObjectUpdate, RoomObject, UpdateSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDistance {
    Small,
    #[default]
    Medium,
    Large,
}

impl MoveDistance {
    /// Step as a percentage of the room span.
    pub fn percent(self) -> f64 {
        match self {
            MoveDistance::Small => 5.0,
            MoveDistance::Medium => 10.0,
            MoveDistance::Large => 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EditAction {
    Move {
        direction: Direction,
        #[serde(default)]
        distance: MoveDistance,
    },
    Rotate {
        degrees: i64,
    },
}

/// `{"target": "desk_1", "action": "move", "direction": "left", "distance": "small"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditCommand {
    /// Object id, or a label when no id matches.
    pub target: String,
    #[serde(flatten)]
    pub action: EditAction,
}

impl EditCommand {
    pub fn new(target: impl Into<String>, action: EditAction) -> Self {
        Self {
            target: target.into(),
            action,
        }
    }

    fn resolve<'a>(&self, layout: &'a Layout) -> Option<&'a RoomObject> {
        layout.get(&self.target).or_else(|| {
            layout
                .objects()
                .find(|o| o.label.eq_ignore_ascii_case(&self.target))
        })
    }

    /// Turn the command into updates for `layout`, with a one-line summary.
    pub fn to_updates(&self, layout: &Layout) -> Result<(UpdateSet, String), PipelineError> {
        let object = self.resolve(layout).ok_or_else(|| {
            PipelineError::EditFailed(format!("no object matches '{}'", self.target))
        })?;
        if object.is_structural() || object.locked {
            return Err(PipelineError::EditFailed(format!(
                "{} '{}' cannot be edited",
                object.label, object.id
            )));
        }

        let (update, summary) = match self.action {
            EditAction::Move {
                direction,
                distance,
            } => {
                let bbox = shifted(object.bbox, direction, distance, layout);
                let summary = format!(
                    "Moved {} {} by {}%",
                    object.label,
                    direction.as_str(),
                    distance.percent()
                );
                (ObjectUpdate::bbox(bbox), summary)
            }
            EditAction::Rotate { degrees } => {
                let target = i64::from(object.orientation) + degrees;
                (
                    ObjectUpdate::orientation(target),
                    format!("Rotated {} by {} degrees", object.label, degrees),
                )
            }
        };

        let mut updates = UpdateSet::new();
        updates.insert(object.id.clone(), update);
        Ok((updates, summary))
    }
}

/// Shift one step, clamped so the box stays inside the room.
fn shifted(bbox: BoundingBox, direction: Direction, distance: MoveDistance, layout: &Layout) -> BoundingBox {
    let step_x = layout.span_x() * distance.percent() / 100.0;
    let step_y = layout.span_y() * distance.percent() / 100.0;
    let max_x = (layout.span_x() - bbox.width).max(0.0);
    let max_y = (layout.span_y() - bbox.height).max(0.0);
    let mut moved = bbox;
    match direction {
        Direction::Left => moved.x = (bbox.x - step_x).clamp(0.0, max_x),
        Direction::Right => moved.x = (bbox.x + step_x).clamp(0.0, max_x),
        Direction::Up => moved.y = (bbox.y - step_y).clamp(0.0, max_y),
        Direction::Down => moved.y = (bbox.y + step_y).clamp(0.0, max_y),
    }
    moved
}
