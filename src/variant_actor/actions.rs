/// Custom actions for variant rows.
#[derive(Debug, Clone)]
pub enum VariantAction {
    /// Adds a signed delta to the durable quantity.
    AdjustQuantity(i64),
    /// Optimistic lock step of the legacy consumer: bumps the version only if
    /// it still equals `expected`.
    BumpVersion { expected: u64 },
    /// Subtracts a draft's sold units at most once per draft.
    SettleDraft { draft_id: i64, delta: i64 },
    /// Drops settled-draft markers once those drafts are deleted.
    ForgetDrafts(Vec<i64>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum VariantActionResult {
    Adjusted { quantity: i64 },
    Bumped { version: u64 },
    Forgotten { remaining: usize },
}
