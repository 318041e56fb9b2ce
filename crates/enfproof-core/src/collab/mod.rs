//! Collaborator boundaries
//!
//! Audio fingerprinting, frame perceptual hashing and trace rendering are
//! opaque collaborators: the pipeline only needs their tokens and bytes.
//! Each boundary is a trait injected into the worker; the implementations
//! here are the defaults the binaries wire up.

mod fingerprint;
mod phash;
mod render;

pub use fingerprint::{AudioFingerprinter, SpectralFingerprinter};
pub use phash::{DifferenceFrameHasher, FrameHasher};
pub use render::{RenderedTrace, SvgTraceRenderer, TraceRenderer};
