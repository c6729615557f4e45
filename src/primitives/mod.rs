//! Low-level building blocks shared by the identifier and checking layers.

/// Positioned file I/O.
pub mod io;
