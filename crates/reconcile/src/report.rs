use kb_registry::RegistryKind;

/// Outcome of reconciling one satellite table against the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub paths_created: u64,
    pub paths_deleted: u64,
    pub rows_added: u64,
    pub rows_removed: u64,
    pub rows_reset: u64,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        *self == ReconcileReport::default()
    }
}

/// A [`ReconcileReport`] tagged with the satellite kind it came from, as
/// returned by [`crate::Reconciler::reconcile_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindedReport {
    pub kind: RegistryKind,
    pub report: ReconcileReport,
}
