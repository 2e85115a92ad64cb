//! Common types shared by the parlor execution library and node.

pub mod casino;
pub mod ledger;

/// Identifier of a balance-holding account (the chat user id).
pub type AccountId = i64;

/// Identifier of the chat a multiplayer round is scoped to.
pub type ChatId = i64;
