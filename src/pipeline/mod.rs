//! Pipeline stages for sorting a scanned bundle.
//!
//! Each submodule implements one step. The pure stages (smooth, group, plan)
//! are shared by the committing path and the dry-run preview.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ classify ──▶ smooth ──▶ group ──▶ plan ──▶ write
//! (URL/path) (render+VLM)  (subtype)  (headers)  (names)  (copy+manifest)
//! ```
//!
//! 1. [`input`]    — canonicalise the user-supplied path or URL to a local file
//! 2. [`render`]   — pdfium behind [`render::PdfBackend`]; `spawn_blocking` wrappers
//! 3. [`encode`]   — grey PNG → base64 `ImageData` for the vision request
//! 4. [`classify`] — batch, rate-limit and retry classifier calls; normalise records
//! 5. [`smooth`]   — repair weak subtypes from strong neighbours
//! 6. [`group`]    — cut the page run into document groups
//! 7. [`plan`]     — filenames and collision policy
//! 8. [`write`]    — copy page ranges, persist, stage the manifest

pub mod classify;
pub mod encode;
pub mod group;
pub mod input;
pub mod plan;
pub mod render;
pub mod smooth;
pub mod write;
