//! Error types for wmdock
//!
//! Every failure is reported to the immediate caller. Only a missing display
//! connection is meant to be fatal for the host application.

use std::path::PathBuf;
use thiserror::Error;
use x11rb::errors::{ConnectionError, ReplyError, ReplyOrIdError};

/// Errors produced by the region table, the image pipeline and the window surface
#[derive(Debug, Error)]
pub enum DockError {
    /// Mouse region index outside `[0, MAX_MOUSE_REGIONS)`
    #[error("mouse region index {index} out of range")]
    InvalidIndex { index: usize },

    /// The display could not resolve or allocate a color name
    #[error("unable to resolve color {name:?}")]
    UnresolvedColor { name: String },

    /// The `rgb.txt` color database could not be read
    #[error("cannot read color database {path:?}")]
    ColorDatabase {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A palette color of an icon could not be allocated
    #[error("failed to allocate color {color:?} for symbol {symbol:?}")]
    ColorAllocationFailed { symbol: String, color: String },

    /// Structurally invalid pixel-map description
    #[error("malformed image: {0}")]
    MalformedImage(String),

    /// No connection to the windowing server could be established
    #[error("display {display:?} unavailable: {reason}")]
    DisplayUnavailable { display: String, reason: String },

    /// Drawable id not known to the backend
    #[error("unknown drawable 0x{0:x}")]
    UnknownDrawable(u32),

    /// Pixel transfer for a depth the backend cannot encode
    #[error("unsupported drawable depth {0}")]
    UnsupportedDepth(u8),

    /// Operation on a window surface that was already closed
    #[error("window surface is closed")]
    SurfaceClosed,

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Reply(#[from] ReplyError),

    #[error(transparent)]
    ReplyOrId(#[from] ReplyOrIdError),
}

pub type Result<T> = std::result::Result<T, DockError>;
