//! Types for interfacing with the sash tiling engine.
//!
//! Everything in this crate is serializable: these are the types that cross the
//! boundary between the engine and its host shell, either as commands bound to
//! keys, or as the persisted layout that survives a shell restart.
#![warn(missing_docs)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A rectangle in screen coordinates, in pixels.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
pub struct Rect {
    /// X coordinate of the top-left corner.
    pub x: i32,
    /// Y coordinate of the top-left corner.
    pub y: i32,
    /// Width of the rectangle.
    pub width: i32,
    /// Height of the rectangle.
    pub height: i32,
}

impl Rect {
    /// Creates a rectangle from its top-left corner and size.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns the center point of the rectangle.
    pub fn center(self) -> (f64, f64) {
        (
            f64::from(self.x) + f64::from(self.width) / 2.,
            f64::from(self.y) + f64::from(self.height) / 2.,
        )
    }

    /// Returns whether the rectangle covers no pixels.
    ///
    /// Freshly mapped windows report an empty frame until the client has
    /// drawn, which is what the placement poll waits out.
    pub fn is_empty(self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

/// Direction of a focus or movement command.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Towards negative X.
    Left,
    /// Towards positive X.
    Right,
    /// Towards negative Y.
    Up,
    /// Towards positive Y.
    Down,
}

impl Direction {
    /// Returns the opposite direction.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// Returns whether the direction is along the X axis.
    pub fn is_horizontal(self) -> bool {
        matches!(self, Direction::Left | Direction::Right)
    }

    /// Returns whether the direction is along the Y axis.
    pub fn is_vertical(self) -> bool {
        matches!(self, Direction::Up | Direction::Down)
    }
}

/// How a container arranges its children.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    /// Children side by side, splitting the width.
    #[default]
    Vertical,
    /// Children top to bottom, splitting the height.
    Horizontal,
    /// Children overlapping in a cascade, focused one in front.
    Stacking,
}

impl LayoutMode {
    /// Returns the mode that follows this one in the cycling order.
    ///
    /// The order is vertical, horizontal, stacking, then back to vertical.
    pub fn next(self) -> Self {
        match self {
            LayoutMode::Vertical => LayoutMode::Horizontal,
            LayoutMode::Horizontal => LayoutMode::Stacking,
            LayoutMode::Stacking => LayoutMode::Vertical,
        }
    }
}

impl fmt::Display for LayoutMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LayoutMode::Vertical => "vertical",
            LayoutMode::Horizontal => "horizontal",
            LayoutMode::Stacking => "stacking",
        };
        write!(f, "{label}")
    }
}

/// Unique id of a toplevel window, assigned by the host shell.
///
/// Window ids are stable for the lifetime of the window and are never reused
/// within a shell session, which is what makes them usable as persisted
/// identity.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a workspace slot.
///
/// Slots come in two flavors: numeric ones matching the digit keybindings, and
/// single-character tags for the mnemonic ones.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(untagged)]
pub enum SlotId {
    /// Numeric slot, e.g. `4`.
    Index(u8),
    /// Tagged slot, e.g. `S`.
    Tag(char),
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotId::Index(index) => write!(f, "{index}"),
            SlotId::Tag(tag) => write!(f, "{tag}"),
        }
    }
}

impl FromStr for SlotId {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(index) = s.parse::<u8>() {
            return Ok(SlotId::Index(index));
        }

        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(tag), None) => Ok(SlotId::Tag(tag)),
            _ => Err("slot must be a number or a single character"),
        }
    }
}

/// A command for the engine to execute.
///
/// Commands act on the active workspace slot and are no-ops while the engine
/// is paused, with the exception of [`Command::SetPaused`] itself.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[cfg_attr(feature = "clap", derive(clap::Subcommand))]
pub enum Command {
    /// Move the focus in the given direction.
    MoveFocus {
        /// Direction to move the focus in.
        #[cfg_attr(feature = "clap", arg(value_enum))]
        direction: Direction,
    },
    /// Swap the focused window with its neighbor in the given direction.
    MoveWindow {
        /// Direction to move the window in.
        #[cfg_attr(feature = "clap", arg(value_enum))]
        direction: Direction,
    },
    /// Group the focused window with its neighbor into a nested container.
    JoinWindow {
        /// Direction of the neighbor to group with.
        #[cfg_attr(feature = "clap", arg(value_enum))]
        direction: Direction,
    },
    /// Grow or shrink the focused pane along the split axis.
    Resize {
        /// Size change in pixels; negative values shrink.
        delta: i32,
    },
    /// Switch the focused container to the next layout mode.
    CycleMode,
    /// Make the given workspace slot active.
    SwitchSlot {
        /// Slot to switch to.
        slot: SlotId,
    },
    /// Send the focused window to the given workspace slot.
    MoveWindowToSlot {
        /// Slot to move the window to.
        slot: SlotId,
    },
    /// Toggle the focused window between tiled and floating.
    ToggleFloating,
    /// Pause or resume the engine.
    SetPaused {
        /// Whether the engine should be paused.
        #[cfg_attr(feature = "clap", arg(action = clap::ArgAction::Set))]
        paused: bool,
    },
}

/// A node of a persisted workspace tree.
///
/// This is the on-disk shape of the layout: only identity, geometry and
/// nesting survive a save, everything session-bound (focus, layout modes,
/// resize weights) is rebuilt from defaults on restore.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SavedNode {
    /// A window leaf, identified by its window id.
    #[serde(rename_all = "camelCase")]
    Window {
        /// Id of the window this leaf tracked.
        id: u64,
        /// Last area assigned to the window, if any.
        work_area: Option<Rect>,
        /// Id of the parent container, if any.
        parent_id: Option<u64>,
    },
    /// A container, holding the nodes in `leafs`.
    #[serde(rename_all = "camelCase")]
    Workspace {
        /// Synthetic id of the container.
        id: u64,
        /// Last area assigned to the container, if any.
        work_area: Option<Rect>,
        /// Id of the parent container, if any; `None` for a slot root.
        parent_id: Option<u64>,
        /// Child nodes, in layout order.
        #[serde(default)]
        leafs: Vec<SavedNode>,
    },
    /// A node written by a version of the engine this one doesn't know about.
    ///
    /// Kept as a parse success so that one unknown node degrades into a gap
    /// rather than discarding the whole saved layout.
    #[serde(other)]
    Unknown,
}

/// A persisted workspace slot: which slot it is plus its tree.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct SavedSlot {
    /// Id of the slot the tree belongs to.
    pub slot: SlotId,
    /// Root node of the slot's tree.
    pub tree: SavedNode,
}

/// The complete persisted state of the engine.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct SavedLayout {
    /// Saved tree of every slot that held windows.
    pub slots: Vec<SavedSlot>,
    /// Windows that were floating, i.e. exempt from tiling.
    #[serde(default)]
    pub floating_windows: Vec<WindowId>,
}

impl SavedLayout {
    /// Serializes the layout to a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses a layout from a JSON string.
    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn layout_mode_cycle_is_closed() {
        let mode = LayoutMode::Vertical;
        assert_eq!(mode.next(), LayoutMode::Horizontal);
        assert_eq!(mode.next().next(), LayoutMode::Stacking);
        assert_eq!(mode.next().next().next(), LayoutMode::Vertical);
    }

    #[test]
    fn direction_opposites() {
        for direction in [
            Direction::Left,
            Direction::Right,
            Direction::Up,
            Direction::Down,
        ] {
            assert_eq!(direction.opposite().opposite(), direction);
            assert_eq!(
                direction.is_horizontal(),
                direction.opposite().is_horizontal()
            );
        }
    }

    #[test]
    fn rect_center() {
        let rect = Rect::new(100, 200, 300, 100);
        assert_eq!(rect.center(), (250., 250.));
        assert!(!rect.is_empty());
        assert!(Rect::new(0, 0, 0, 150).is_empty());
    }

    #[test]
    fn slot_id_parses_and_prints() {
        assert_eq!("4".parse::<SlotId>(), Ok(SlotId::Index(4)));
        assert_eq!("S".parse::<SlotId>(), Ok(SlotId::Tag('S')));
        assert!("".parse::<SlotId>().is_err());
        assert!("SB".parse::<SlotId>().is_err());

        assert_eq!(SlotId::Index(4).to_string(), "4");
        assert_eq!(SlotId::Tag('S').to_string(), "S");
    }

    #[test]
    fn slot_id_serializes_untagged() {
        assert_eq!(json!(SlotId::Index(7)), json!(7));
        assert_eq!(json!(SlotId::Tag('M')), json!("M"));

        let slots: Vec<SlotId> = serde_json::from_value(json!([1, "S", 9])).unwrap();
        assert_eq!(
            slots,
            vec![SlotId::Index(1), SlotId::Tag('S'), SlotId::Index(9)]
        );
    }

    #[test]
    fn saved_node_json_shape() {
        let node = SavedNode::Workspace {
            id: 1,
            work_area: Some(Rect::new(0, 0, 300, 100)),
            parent_id: None,
            leafs: vec![SavedNode::Window {
                id: 42,
                work_area: Some(Rect::new(0, 0, 150, 100)),
                parent_id: Some(1),
            }],
        };

        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({
                "type": "workspace",
                "id": 1,
                "workArea": { "x": 0, "y": 0, "width": 300, "height": 100 },
                "parentId": null,
                "leafs": [{
                    "type": "window",
                    "id": 42,
                    "workArea": { "x": 0, "y": 0, "width": 150, "height": 100 },
                    "parentId": 1,
                }],
            })
        );
    }

    #[test]
    fn unknown_saved_node_still_parses() {
        let node: SavedNode = serde_json::from_value(json!({
            "type": "gadget",
            "id": 5,
        }))
        .unwrap();
        assert_eq!(node, SavedNode::Unknown);
    }

    #[test]
    fn saved_layout_round_trips_through_json() {
        let layout = SavedLayout {
            slots: vec![SavedSlot {
                slot: SlotId::Tag('B'),
                tree: SavedNode::Workspace {
                    id: 0,
                    work_area: None,
                    parent_id: None,
                    leafs: Vec::new(),
                },
            }],
            floating_windows: vec![WindowId(3), WindowId(8)],
        };

        let json = layout.to_json().unwrap();
        assert_eq!(SavedLayout::from_json(&json).unwrap(), layout);
    }

    #[test]
    fn missing_floating_windows_defaults_to_empty() {
        let layout = SavedLayout::from_json(r#"{"slots":[]}"#).unwrap();
        assert_eq!(layout, SavedLayout::default());
    }
}
