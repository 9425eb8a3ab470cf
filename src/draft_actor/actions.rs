use crate::domain::Promotion;

/// Custom actions for draft rows.
#[derive(Debug, Clone)]
pub enum DraftAction {
    /// Records the promotion outcome. Succeeds once from `Undecided`; repeating
    /// the same decision is a no-op, contradicting it is rejected.
    Decide(Promotion),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DraftActionResult {
    /// `changed` is false when the draft already carried this decision.
    Decided { promotion: Promotion, changed: bool },
}
