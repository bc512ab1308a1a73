//! Slot-fill evaluator: pure set difference between an intent's required
//! fields and the fields a ticket already knows. No I/O, no side effects.

use std::collections::BTreeSet;

use crate::schema::FieldName;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotFillReport {
    /// Missing fields, in the schema's declared order.
    pub missing: Vec<FieldName>,
    pub complete: bool,
}

pub fn evaluate(required: &[FieldName], known: &BTreeSet<FieldName>) -> SlotFillReport {
    let missing: Vec<FieldName> =
        required.iter().filter(|field| !known.contains(*field)).cloned().collect();
    let complete = missing.is_empty();
    SlotFillReport { missing, complete }
}
