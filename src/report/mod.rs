//! Reconciled report list built from the remote event streams.

pub mod reconciler;
pub mod render;

// Re-export commonly used types
pub use reconciler::{Reconciler, ReportBoard, ReportItem};
pub use render::{render_report, render_reports, EMPTY_MESSAGE};
