//! Coins: the value object an output carries.

use serde::{Deserialize, Serialize};

use lib_types::{Address, Amount};

/// An amount owned by a receiver address. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coins {
    amount: Amount,
    receiver: Address,
}

impl Coins {
    pub const fn new(amount: Amount, receiver: Address) -> Self {
        Self { amount, receiver }
    }

    pub const fn amount(&self) -> Amount {
        self.amount
    }

    pub const fn receiver(&self) -> Address {
        self.receiver
    }
}
