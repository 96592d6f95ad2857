//! Contact-center KPI pipeline and automation readiness scoring.
//!
//! The crate ingests a table of interaction records, runs a configurable set
//! of per-dimension metric calculators over it, assembles a JSON-compatible
//! result tree, and folds selected indicators into a single 0-10 automation
//! readiness score with a qualitative classification.

pub mod config;
pub mod dataset;
pub mod dimensions;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod scorer;
pub mod telemetry;
