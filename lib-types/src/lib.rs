//! Concilium ledger primitives.
//! Stable, protocol-neutral, behavior-free.

pub mod primitives;

pub use primitives::{
    Address, Amount, BlockHeight, GroupId, OutputIndex, TxHash, ADDRESS_PREFIX,
};
