//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random ledger data that passes record
//! validation.

use branchsync_protocol::{now, Branch, RecordId, Transaction, TransactionType};
use chrono::Duration;
use proptest::prelude::*;

/// Strategy for generating non-nil record ids.
pub fn record_id_strategy() -> impl Strategy<Value = RecordId> {
    prop::array::uniform16(any::<u8>())
        .prop_map(RecordId::from_bytes)
        .prop_filter("Record id must not be nil", |id| !id.is_nil())
}

/// Strategy for generating branch codes.
pub fn branch_code_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][A-Z0-9]{1,9}").expect("Invalid regex")
}

/// Strategy for generating transaction directions.
pub fn transaction_type_strategy() -> impl Strategy<Value = TransactionType> {
    prop_oneof![Just(TransactionType::In), Just(TransactionType::Out)]
}

/// Strategy for generating valid (positive, finite) amounts in cents.
pub fn amount_strategy() -> impl Strategy<Value = f64> {
    (1u64..100_000_000).prop_map(|cents| cents as f64 / 100.0)
}

/// Strategy for generating an age in seconds, up to a week.
pub fn age_strategy() -> impl Strategy<Value = Duration> {
    (0i64..7 * 24 * 3600).prop_map(Duration::seconds)
}

/// Strategy for generating a branch created some time in the past week.
pub fn branch_strategy() -> impl Strategy<Value = Branch> {
    (
        record_id_strategy(),
        branch_code_strategy(),
        "[a-z ]{0,24}",
        age_strategy(),
    )
        .prop_map(|(id, code, description, age)| {
            let mut branch = Branch::new(code.clone(), format!("Branch {code}"))
                .with_description(description);
            branch.id = id;
            branch.created_at = now() - age;
            branch.updated_at = branch.created_at;
            branch
        })
}

/// Strategy for generating a transaction owned by `branch_id`.
pub fn transaction_strategy(branch_id: RecordId) -> impl Strategy<Value = Transaction> {
    (
        record_id_strategy(),
        transaction_type_strategy(),
        prop::sample::select(vec!["sales", "supplies", "salary", "rent", "utilities"]),
        amount_strategy(),
        age_strategy(),
    )
        .prop_map(move |(id, tx_type, category, amount, age)| {
            let mut tx = Transaction::new(branch_id, tx_type, category, amount);
            tx.id = id;
            tx.created_at = now() - age;
            tx
        })
}

/// Strategy for generating a ledger: branches with unique codes, each
/// owning up to `max_per_branch` transactions.
pub fn ledger_strategy(
    max_branches: usize,
    max_per_branch: usize,
) -> impl Strategy<Value = (Vec<Branch>, Vec<Transaction>)> {
    prop::collection::vec(branch_strategy(), 1..=max_branches.max(1))
        .prop_map(|mut branches| {
            for (i, branch) in branches.iter_mut().enumerate() {
                branch.code = format!("{}{i}", branch.code);
            }
            branches
        })
        .prop_flat_map(move |branches| {
            let per_branch: Vec<_> = branches
                .iter()
                .map(|b| prop::collection::vec(transaction_strategy(b.id), 0..=max_per_branch))
                .collect();
            (Just(branches), per_branch)
        })
        .prop_map(|(branches, per_branch)| {
            let transactions = per_branch.into_iter().flatten().collect();
            (branches, transactions)
        })
}
