//! Container-tree tiling engine for desktop shells.
//!
//! The crate is the layout brain of a tiling setup, with no compositor code
//! of its own. A host shell implements [`layout::Shell`] and
//! [`layout::ShellWindow`] over its native window objects, constructs a
//! [`layout::WorkspaceSet`], and forwards window lifecycle events and user
//! commands into it. The set answers by calling back into the shell with
//! concrete frame rectangles, minimize requests and focus changes.
//!
//! The wire-level vocabulary (commands, directions, the saved-layout schema)
//! lives in the `sash-ipc` crate so that external tools can speak it without
//! pulling in the engine.

pub mod layout;
