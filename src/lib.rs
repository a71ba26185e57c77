#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

#[macro_use]
pub mod logger;

pub mod canvas;
pub mod cli;
pub mod components;
pub mod io;
pub mod ops;
pub mod project;
pub mod selection;
pub mod settings;

pub use canvas::{CanvasState, Layer, LayerId, PixelBuffer, Placement};
pub use project::EditorSession;
pub use selection::{Selection, SelectionEngine};
