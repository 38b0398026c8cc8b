//! Text layer extraction and selection capture

mod extractor;
mod runs;
mod selection;

pub use extractor::{TextLayer, TextLayerExtractor};
pub use runs::{layout, TextRun, TextSpan};
pub use selection::{ClientSelection, InteractionMode, SelectionCapture, TextSelection};
