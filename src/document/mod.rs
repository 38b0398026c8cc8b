//! Document session
//!
//! Opens a document source, decodes it through a pluggable backend and hands
//! out memoized page handles. Decoding and rasterization happen on blocking
//! threads; everything else is async.

mod loader;
mod session;
mod source;
mod traits;
mod types;

#[cfg(feature = "mupdf")]
mod mupdf_backend;

#[cfg(test)]
pub(crate) mod testing;

pub use loader::{open_document, open_document_with_client, shared_client, DocumentLoader};
pub use session::DocumentSession;
pub use source::DocumentSource;
pub use traits::{BackendError, DecodedDocument, DocumentBackend};
pub use types::{PageGeometry, PageHandle, Viewport};

#[cfg(feature = "mupdf")]
pub use mupdf_backend::MupdfBackend;
