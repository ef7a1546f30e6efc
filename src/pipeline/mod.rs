//! Stateless building blocks used by the conversion engine.
//!
//! ## Data Flow
//!
//! ```text
//! bytes ──▶ sniff ──┐
//!                   ├──▶ validate ──▶ classify ──▶ backend ──▶ normalize (merge only)
//! path  ────────────┘                    │
//! URL ──▶ download ──▶ markup ───────────┘            paths ──▶ output file name
//! ```
//!
//! 1. [`sniff`]     identify a buffer's type from its leading bytes
//! 2. [`validate`]  existence, containment, allow-list, size and lock checks
//! 3. [`classify`]  map an extension to the backend call that renders it
//! 4. [`markup`]    decode HTML and make its charset explicit
//! 5. [`download`]  fetch HTML for URL conversions
//! 6. [`normalize`] scale out-of-range pages to A4 before merging
//! 7. [`paths`]     collision-free output names

pub mod classify;
pub mod download;
pub mod markup;
pub mod normalize;
pub mod paths;
pub mod sniff;
pub mod validate;
