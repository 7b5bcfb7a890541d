//! Host environment adjustments made before probing.

pub mod limits;
