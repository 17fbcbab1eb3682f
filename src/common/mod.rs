//! Data structures shared by the frontends and the analysis.

pub mod cfg;
