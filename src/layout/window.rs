use std::rc::{Rc, Weak};

use sash_ipc::{Rect, WindowId};
use tracing::{debug, trace, warn};

use super::{Options, Shell, ShellWindow, WindowFlags};

/// A leaf of a workspace tree, tracking one toplevel window.
///
/// The window id is the leaf's identity. The handle is only a cache: the host
/// can invalidate it at any time, so every operation goes through
/// [`WindowLeaf::resolve`] and degrades to a no-op when the window is gone.
#[derive(Debug)]
pub struct WindowLeaf<W: ShellWindow> {
    id: WindowId,
    handle: Weak<W>,
    visible: bool,
}

impl<W: ShellWindow> WindowLeaf<W> {
    pub fn new(id: WindowId) -> Self {
        Self {
            id,
            handle: Weak::new(),
            visible: true,
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Caches a handle for the leaf's window.
    ///
    /// Handles with a mismatched id are rejected.
    pub fn attach_handle(&mut self, window: &Rc<W>) -> bool {
        if window.id() != self.id {
            warn!(
                "window {} does not belong to the leaf for window {}",
                window.id(),
                self.id
            );
            return false;
        }

        self.handle = Rc::downgrade(window);
        true
    }

    /// Returns a live handle to the tracked window, re-resolving through the
    /// shell when the cached one has died.
    fn resolve(&mut self, shell: &impl Shell<Window = W>) -> Option<Rc<W>> {
        if let Some(window) = self.handle.upgrade() {
            if window.is_alive() && window.id() == self.id {
                return Some(window);
            }
        }

        let Some(window) = shell.window(self.id) else {
            debug!("window {} is gone", self.id);
            return None;
        };
        self.handle = Rc::downgrade(&window);
        Some(window)
    }

    /// Pushes `rect` to the window as its new frame.
    ///
    /// Windows that manage their own geometry (override-redirect, taskbar
    /// skips) and fullscreen windows are left alone.
    pub fn apply_work_area(&mut self, shell: &impl Shell<Window = W>, rect: Rect) {
        let Some(window) = self.resolve(shell) else {
            return;
        };

        let flags = window.flags();
        if flags.intersects(WindowFlags::OVERRIDE_REDIRECT | WindowFlags::SKIP_TASKBAR) {
            return;
        }
        if window.is_fullscreen() {
            trace!("window {} is fullscreen, leaving its frame alone", self.id);
            return;
        }

        // A maximized window ignores frame changes on most shells.
        if window.is_maximized() {
            if let Err(err) = window.unmaximize() {
                trace!("error unmaximizing window {}: {err:?}", self.id);
            }
        }

        if let Err(err) = window.move_resize(rect) {
            warn!("error moving window {}: {err:?}", self.id);
        }
    }

    /// Activates the window, unminimizing it first if needed, and warps the
    /// pointer to the center of `area`.
    pub fn focus(
        &mut self,
        shell: &impl Shell<Window = W>,
        area: Option<Rect>,
        options: &Options,
    ) -> bool {
        let Some(window) = self.resolve(shell) else {
            return false;
        };

        if window.is_minimized() {
            if let Err(err) = window.unminimize() {
                warn!("error unminimizing window {}: {err:?}", self.id);
                return false;
            }
        }
        if let Err(err) = window.activate() {
            warn!("error activating window {}: {err:?}", self.id);
            return false;
        }

        if options.warp_pointer {
            if let Some(area) = area {
                let (x, y) = area.center();
                shell.warp_pointer(x, y);
            }
        }

        true
    }

    /// Makes the window visible again after [`WindowLeaf::hide`].
    pub fn show(&mut self, shell: &impl Shell<Window = W>) {
        self.visible = true;

        let Some(window) = self.resolve(shell) else {
            return;
        };
        if window.is_minimized() {
            if let Err(err) = window.unminimize() {
                warn!("error unminimizing window {}: {err:?}", self.id);
            }
        }
    }

    /// Hides the window by minimizing it.
    pub fn hide(&mut self, shell: &impl Shell<Window = W>) {
        self.visible = false;

        let Some(window) = self.resolve(shell) else {
            return;
        };
        if !window.is_minimized() {
            if let Err(err) = window.minimize() {
                warn!("error minimizing window {}: {err:?}", self.id);
            }
        }
    }
}
