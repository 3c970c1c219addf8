use crate::model::CaseNo;

/// Routing hooks owned by the shell.
///
/// The store only calls `not_found`, when a selection misses. Routing to a
/// selected case is left to the shell through `navigate_to`.
pub trait Navigator: Send + Sync {
    fn not_found(&self);

    fn navigate_to(&self, case_no: CaseNo);
}

/// Navigator for headless use, where there is nothing to route.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn not_found(&self) {
        tracing::debug!("not_found ignored by NoopNavigator");
    }

    fn navigate_to(&self, case_no: CaseNo) {
        tracing::debug!(%case_no, "navigate_to ignored by NoopNavigator");
    }
}
