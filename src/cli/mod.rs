pub mod annotate;
pub mod ascii_preview;

pub use annotate::DebugFrameSaver;
pub use ascii_preview::{AsciiRenderer, TerminalPreview};
