//! Window layout logic.
//!
//! The layout is a set of workspace slots, each holding a tree of containers
//! with windows at the leaves. A container splits its work area among its
//! children side by side, top to bottom, or as an overlapping stack, and any
//! child can itself be a container, so splits nest freely.
//!
//! The engine is headless: it never talks to a compositor directly. The host
//! shell sits behind [`Shell`] and [`ShellWindow`], gets told which frames to
//! move where, and feeds window lifecycle events back in. Everything is
//! synchronous and single-threaded, which keeps the call paths simple and
//! makes the whole engine drivable from tests with a scripted fake shell.
//!
//! Focus lives in the tree: every container remembers which child is focused,
//! so the path from the root always names exactly one active window, and
//! focus movement is tree navigation rather than geometry guessing (geometry
//! only breaks ties between siblings).

use std::collections::HashMap;
use std::rc::Rc;

use anyhow::Context;
use bitflags::bitflags;
use sash_ipc::{Command, Direction, Rect, SavedLayout, SavedSlot, SlotId, WindowId};
use tracing::{debug, warn};

pub mod tree;
pub mod window;

mod save;

pub use tree::{NodeId, NodeKey, NodeTree};
pub use window::WindowLeaf;

/// How many times a new window is polled for usable geometry before it is
/// placed regardless.
pub const MAX_PLACEMENT_POLLS: u32 = 50;

/// A window as the host shell sees it.
///
/// Geometry is in the shell's logical coordinates. The mutating calls report
/// shell-side failures; the engine logs those and carries on, treating them
/// as "fixed up by the next layout pass".
pub trait ShellWindow: std::fmt::Debug {
    fn id(&self) -> WindowId;

    /// Whether the shell still knows this window.
    fn is_alive(&self) -> bool;

    fn frame_rect(&self) -> Rect;

    fn kind(&self) -> WindowKind;

    fn flags(&self) -> WindowFlags;

    fn is_minimized(&self) -> bool;
    fn is_maximized(&self) -> bool;
    fn is_fullscreen(&self) -> bool;

    fn move_resize(&self, rect: Rect) -> anyhow::Result<()>;
    fn minimize(&self) -> anyhow::Result<()>;
    fn unminimize(&self) -> anyhow::Result<()>;
    fn unmaximize(&self) -> anyhow::Result<()>;

    /// Raises the window and gives it input focus.
    fn activate(&self) -> anyhow::Result<()>;
}

/// Coarse window classification, used to decide what gets tiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Normal,
    Dialog,
    Dock,
    Other,
}

bitflags! {
    /// Window properties that exempt a window from tiling.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct WindowFlags: u8 {
        const OVERRIDE_REDIRECT = 1;
        const SKIP_TASKBAR = 1 << 1;
        const SKIP_PAGER = 1 << 2;
    }
}

/// Handle for a scheduled placement poll, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollToken(pub u64);

/// The engine's window into the host shell.
///
/// Single-threaded by construction; implementations hand out `Rc`s to their
/// windows and are free to use interior mutability.
pub trait Shell {
    type Window: ShellWindow;

    /// Looks up a live window by id.
    fn window(&self, id: WindowId) -> Option<Rc<Self::Window>>;

    /// Ids of every window the shell currently tracks.
    fn window_ids(&self) -> Vec<WindowId>;

    /// Moves the pointer to the given position in logical coordinates.
    fn warp_pointer(&self, x: f64, y: f64);

    /// Asks to be called back via [`WorkspaceSet::poll_window`] once the
    /// shell has had a chance to map the window.
    fn schedule_poll(&self, id: WindowId) -> PollToken;

    fn cancel_poll(&self, token: PollToken);
}

/// Layout tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    /// Smallest extent a split will shrink a pane to, in logical pixels.
    pub min_pane_px: i32,
    /// Offset between consecutive windows in a stacking container.
    pub stack_overlap_px: i32,
    /// Whether focus changes move the pointer onto the focused window.
    pub warp_pointer: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            min_pane_px: 80,
            stack_overlap_px: 20,
            warp_pointer: true,
        }
    }
}

/// Whether a window participates in tiling at all.
pub fn is_trackable<W: ShellWindow>(window: &W) -> bool {
    window.kind() == WindowKind::Normal
        && !window.flags().intersects(
            WindowFlags::OVERRIDE_REDIRECT | WindowFlags::SKIP_TASKBAR | WindowFlags::SKIP_PAGER,
        )
}

#[derive(Debug)]
struct Slot<S: Shell> {
    id: SlotId,
    tree: NodeTree<S>,
}

#[derive(Debug)]
struct PendingPlacement {
    token: PollToken,
    attempts: u32,
}

/// All workspace slots plus the window bookkeeping around them.
///
/// This is the type a host shell drives: lifecycle events go into the
/// `window_*` methods, user actions come in as [`Command`]s, and the set
/// decides which slot's tree they land in. Exactly one slot is active at a
/// time; the active slot's windows are shown, everything else is minimized
/// away.
#[derive(Debug)]
pub struct WorkspaceSet<S: Shell> {
    shell: Rc<S>,
    slots: Vec<Slot<S>>,
    active_idx: usize,
    work_area: Option<Rect>,
    floating: Vec<WindowId>,
    pending: HashMap<WindowId, PendingPlacement>,
    last_focused: Option<WindowId>,
    paused: bool,
}

impl<S: Shell> WorkspaceSet<S> {
    pub fn new(
        shell: Rc<S>,
        slot_ids: impl IntoIterator<Item = SlotId>,
        options: Rc<Options>,
    ) -> Self {
        let mut slots: Vec<Slot<S>> = Vec::new();
        for id in slot_ids {
            if slots.iter().any(|slot| slot.id == id) {
                warn!("duplicate workspace slot {id}, keeping the first one");
                continue;
            }
            slots.push(Slot {
                id,
                tree: NodeTree::new(shell.clone(), options.clone()),
            });
        }
        if slots.is_empty() {
            warn!("no workspace slots configured");
        }

        Self {
            shell,
            slots,
            active_idx: 0,
            work_area: None,
            floating: Vec::new(),
            pending: HashMap::new(),
            last_focused: None,
            paused: false,
        }
    }

    /// The slot set the stock keybindings expect: digits 1 to 9 plus the S,
    /// B, M and T tags.
    pub fn standard_slots() -> Vec<SlotId> {
        (1..=9u8)
            .map(SlotId::Index)
            .chain(['S', 'B', 'M', 'T'].into_iter().map(SlotId::Tag))
            .collect()
    }

    pub fn active_slot(&self) -> Option<SlotId> {
        self.slots.get(self.active_idx).map(|slot| slot.id)
    }

    pub fn active_tree(&self) -> Option<&NodeTree<S>> {
        self.slots.get(self.active_idx).map(|slot| &slot.tree)
    }

    pub fn tree(&self, slot: SlotId) -> Option<&NodeTree<S>> {
        self.slots
            .iter()
            .find(|candidate| candidate.id == slot)
            .map(|candidate| &candidate.tree)
    }

    pub fn is_floating(&self, id: WindowId) -> bool {
        self.floating.contains(&id)
    }

    pub fn last_focused(&self) -> Option<WindowId> {
        self.last_focused
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// A new window got mapped.
    ///
    /// Trackable windows are scheduled for placement once they report usable
    /// geometry. Nothing is placed synchronously; shells tend to map windows
    /// with a zero-sized frame for the first few moments.
    pub fn window_appeared(&mut self, id: WindowId) {
        if self.paused {
            return;
        }
        let Some(window) = self.shell.window(id) else {
            return;
        };
        if !is_trackable(&*window) {
            debug!("window {id} is not trackable, ignoring it");
            return;
        }
        if self.pending.contains_key(&id) {
            return;
        }

        let token = self.shell.schedule_poll(id);
        self.pending.insert(id, PendingPlacement { token, attempts: 0 });
    }

    /// A placement poll scheduled via [`Shell::schedule_poll`] fired.
    ///
    /// Re-arms the poll while the window still reports empty geometry, up to
    /// [`MAX_PLACEMENT_POLLS`] times; after that the window is placed with
    /// whatever frame it has. Runs even while paused, so a window that
    /// appeared just before a pause is not lost.
    pub fn poll_window(&mut self, id: WindowId) {
        let Some(pending) = self.pending.get_mut(&id) else {
            // A cancelled poll that fired anyway.
            return;
        };

        let Some(window) = self.shell.window(id) else {
            debug!("window {id} went away before it could be placed");
            self.pending.remove(&id);
            return;
        };
        if !is_trackable(&*window) {
            debug!("window {id} stopped being trackable, ignoring it");
            self.pending.remove(&id);
            return;
        }

        if window.frame_rect().is_empty() && pending.attempts < MAX_PLACEMENT_POLLS {
            pending.attempts += 1;
            pending.token = self.shell.schedule_poll(id);
            return;
        }

        self.pending.remove(&id);

        if self.slots.iter().any(|slot| slot.tree.contains_window(id)) {
            // Already tracked; just freshen the layout.
            self.apply_work_areas();
            return;
        }

        let mut leaf = WindowLeaf::new(id);
        leaf.attach_handle(&window);
        let Some(slot) = self.slots.get_mut(self.active_idx) else {
            warn!("no workspace slots configured, window {id} is left untiled");
            return;
        };
        let root = slot.tree.root();
        slot.tree.insert_window(root, leaf);
        self.apply_work_areas();
    }

    /// A window went away.
    ///
    /// Not gated on pause: a stale tree entry would otherwise pin dead
    /// windows until the next resume.
    pub fn window_unmanaged(&mut self, id: WindowId) {
        if let Some(pending) = self.pending.remove(&id) {
            self.shell.cancel_poll(pending.token);
        }

        let active_idx = self.active_idx;
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            slot.tree.remove_window(id, idx == active_idx);
        }
        self.floating.retain(|&window| window != id);
        if self.last_focused == Some(id) {
            self.last_focused = None;
        }
    }

    /// The shell's input focus moved to `id`.
    ///
    /// Aligns the focus chain of the owning tree with it, and switches the
    /// active slot when the window is tiled somewhere else.
    pub fn window_focused(&mut self, id: WindowId) {
        self.last_focused = Some(id);

        if self.paused || self.floating.contains(&id) || self.pending.contains_key(&id) {
            return;
        }

        let Some(idx) = self
            .slots
            .iter_mut()
            .position(|slot| slot.tree.set_focused_window(id))
        else {
            return;
        };
        if idx != self.active_idx {
            debug!("focus went to a window on slot {}, following it", self.slots[idx].id);
            self.active_idx = idx;
            self.apply_work_areas();
        }
    }

    /// The user finished dragging a window frame.
    pub fn window_drag_ended(&mut self, id: WindowId) {
        if self.paused || self.floating.contains(&id) {
            return;
        }
        // Wherever the frame was dragged to, the layout wins.
        if let Some(slot) = self.slots.get_mut(self.active_idx) {
            slot.tree.show_root();
        }
    }

    /// The usable screen area changed.
    pub fn update_work_area(&mut self, area: Rect) {
        self.work_area = Some(area);
        if self.paused {
            return;
        }
        self.apply_work_areas();
    }

    pub fn move_focus(&mut self, direction: Direction) -> bool {
        if self.paused {
            return false;
        }
        let Some(slot) = self.slots.get_mut(self.active_idx) else {
            return false;
        };
        let root = slot.tree.root();
        slot.tree.move_focus(root, direction)
    }

    pub fn move_window(&mut self, direction: Direction) -> bool {
        if self.paused {
            return false;
        }
        let Some(slot) = self.slots.get_mut(self.active_idx) else {
            return false;
        };
        let root = slot.tree.root();
        slot.tree.move_window(root, direction)
    }

    pub fn join_window(&mut self, direction: Direction) -> bool {
        if self.paused {
            return false;
        }
        let Some(slot) = self.slots.get_mut(self.active_idx) else {
            return false;
        };
        let root = slot.tree.root();
        slot.tree.join_window(root, direction)
    }

    pub fn resize(&mut self, delta_px: i32) {
        if self.paused {
            return;
        }
        if let Some(slot) = self.slots.get_mut(self.active_idx) {
            let root = slot.tree.root();
            slot.tree.resize(root, delta_px);
        }
    }

    pub fn cycle_mode(&mut self) {
        if self.paused {
            return;
        }
        if let Some(slot) = self.slots.get_mut(self.active_idx) {
            let root = slot.tree.root();
            slot.tree.cycle_mode(root);
        }
    }

    /// Makes `slot` the active one, minimizing the outgoing slot's windows.
    pub fn switch_slot(&mut self, slot: SlotId) -> bool {
        if self.paused {
            return false;
        }
        let Some(idx) = self.slots.iter().position(|candidate| candidate.id == slot) else {
            warn!("unknown workspace slot {slot}");
            return false;
        };
        if idx == self.active_idx {
            return true;
        }

        debug!("switching to slot {slot}");
        self.active_idx = idx;
        self.apply_work_areas();
        true
    }

    /// Sends the focused window of the active slot to `slot`.
    pub fn move_window_to_slot(&mut self, slot: SlotId) -> bool {
        if self.paused {
            return false;
        }
        let Some(target_idx) = self.slots.iter().position(|candidate| candidate.id == slot)
        else {
            warn!("unknown workspace slot {slot}");
            return false;
        };
        if target_idx == self.active_idx {
            return false;
        }

        let Some(active) = self.slots.get_mut(self.active_idx) else {
            return false;
        };
        let Some(id) = active.tree.focused_window() else {
            return false;
        };
        let Some(leaf) = active.tree.extract_window(id) else {
            return false;
        };

        let target = &mut self.slots[target_idx];
        let root = target.tree.root();
        target.tree.insert_window(root, leaf);
        self.apply_work_areas();
        true
    }

    /// Toggles the most recently focused window between floating and tiled.
    pub fn toggle_floating(&mut self) {
        if self.paused {
            return;
        }
        let Some(id) = self.last_focused else {
            debug!("no focused window to toggle floating for");
            return;
        };

        if let Some(idx) = self.floating.iter().position(|&window| window == id) {
            self.floating.remove(idx);

            let shell = self.shell.clone();
            let Some(slot) = self.slots.get_mut(self.active_idx) else {
                return;
            };
            let mut leaf = WindowLeaf::new(id);
            if let Some(window) = shell.window(id) {
                leaf.attach_handle(&window);
            }
            let root = slot.tree.root();
            slot.tree.insert_window(root, leaf);
            slot.tree.show_root();
        } else {
            let shell = self.shell.clone();
            let Some(slot) = self.slots.get_mut(self.active_idx) else {
                return;
            };
            if !slot.tree.remove_window(id, false) {
                debug!("window {id} is not tiled on the active slot, not floating it");
                return;
            }
            slot.tree.show_root();
            self.floating.push(id);

            // Keep the window on top now that it is out of the layout.
            if let Some(window) = shell.window(id) {
                if let Err(err) = window.activate() {
                    warn!("error activating window {id}: {err:?}");
                }
            }
        }
    }

    /// Pauses or resumes tiling.
    ///
    /// While paused, events still keep the bookkeeping current but nothing
    /// is moved or resized. Resuming re-applies the layout in one pass.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        if paused {
            debug!("tiling paused");
        } else {
            debug!("tiling resumed");
            self.apply_work_areas();
        }
    }

    pub fn apply_command(&mut self, command: Command) {
        match command {
            Command::MoveFocus { direction } => {
                self.move_focus(direction);
            }
            Command::MoveWindow { direction } => {
                self.move_window(direction);
            }
            Command::JoinWindow { direction } => {
                self.join_window(direction);
            }
            Command::Resize { delta } => self.resize(delta),
            Command::CycleMode => self.cycle_mode(),
            Command::SwitchSlot { slot } => {
                self.switch_slot(slot);
            }
            Command::MoveWindowToSlot { slot } => {
                self.move_window_to_slot(slot);
            }
            Command::ToggleFloating => self.toggle_floating(),
            Command::SetPaused { paused } => self.set_paused(paused),
        }
    }

    /// Captures every non-empty slot plus the floating set as plain data.
    pub fn save(&self) -> SavedLayout {
        SavedLayout {
            slots: self
                .slots
                .iter()
                .filter(|slot| !slot.tree.is_empty())
                .map(|slot| SavedSlot {
                    slot: slot.id,
                    tree: slot.tree.to_saved(),
                })
                .collect(),
            floating_windows: self.floating.clone(),
        }
    }

    /// Rebuilds slot trees from a previous [`WorkspaceSet::save`].
    ///
    /// Entries for unknown slots are skipped, and windows the shell no
    /// longer knows are pruned while restoring.
    pub fn restore(&mut self, saved: &SavedLayout) {
        let _span = tracy_client::span!("WorkspaceSet::restore");

        let existing = self.shell.window_ids();
        for entry in &saved.slots {
            let Some(slot) = self.slots.iter_mut().find(|slot| slot.id == entry.slot) else {
                warn!("saved layout references unknown slot {}, skipping it", entry.slot);
                continue;
            };
            slot.tree.restore_into_root(&entry.tree, &existing);
        }

        self.floating = saved
            .floating_windows
            .iter()
            .copied()
            .filter(|id| existing.contains(id))
            .collect();
    }

    pub fn save_json(&self) -> anyhow::Result<String> {
        self.save().to_json().context("serializing the layout")
    }

    pub fn restore_json(&mut self, data: &str) -> anyhow::Result<()> {
        let saved = SavedLayout::from_json(data).context("parsing the saved layout")?;
        self.restore(&saved);
        Ok(())
    }

    /// Pushes work areas into every slot, showing the active slot's windows
    /// and hiding the rest.
    fn apply_work_areas(&mut self) {
        let _span = tracy_client::span!("WorkspaceSet::apply_work_areas");

        let Some(area) = self.work_area else {
            return;
        };
        let active_idx = self.active_idx;
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            slot.tree.set_root_work_area(area);
            if idx == active_idx {
                slot.tree.show_root();
            } else {
                slot.tree.hide_root();
            }
        }
    }
}

#[cfg(test)]
impl<S: Shell> WorkspaceSet<S> {
    pub fn verify_invariants(&self) {
        let mut all_ids = Vec::new();
        for slot in &self.slots {
            slot.tree.verify_invariants();
            all_ids.extend(slot.tree.window_ids());
        }
        let total = all_ids.len();
        all_ids.sort_unstable();
        all_ids.dedup();
        assert_eq!(all_ids.len(), total, "a window is tiled on more than one slot");

        for id in &self.floating {
            assert!(!all_ids.contains(id), "floating window {id} is also tiled");
        }

        assert!(self.slots.is_empty() || self.active_idx < self.slots.len());
    }
}
