//! `tx` class: standard transactions.

/// Class identifier of `tx`.
pub const CLASS_ID: u16 = 90;

amqp_method! {
    Select(CLASS_ID, 10, "tx.select") {}
    SelectOk(CLASS_ID, 11, "tx.select-ok") {}
    Commit(CLASS_ID, 20, "tx.commit") {}
    CommitOk(CLASS_ID, 21, "tx.commit-ok") {}
    Rollback(CLASS_ID, 30, "tx.rollback") {}
    RollbackOk(CLASS_ID, 31, "tx.rollback-ok") {}
}
