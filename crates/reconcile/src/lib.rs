pub mod reconciler;
pub mod report;
pub mod rpc;
pub mod satellite;

pub use reconciler::Reconciler;
pub use report::{KindedReport, ReconcileReport};
pub use satellite::{DepthReconciler, SatelliteReconciler, StatusReconciler};
