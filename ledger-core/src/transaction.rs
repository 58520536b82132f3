//! Transaction (posting) representation within entries

use std::fmt;

use ledger_math::amount::Amount;

use crate::account::AccountRef;

bitflags::bitflags! {
    /// Transaction flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TransactionFlags: u16 {
        const NORMAL = 0x0000;
        /// account specified with (parens)
        const VIRTUAL = 0x0001;
        /// virtual posting that must still balance [brackets]
        const BALANCE = 0x0002;
        /// generated by an automated entry
        const AUTO = 0x0004;
    }
}

/// One posting of an amount against an account
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Account this transaction posts to
    pub account: AccountRef,
    /// Amount posted
    pub amount: Amount,
    /// Optional cost (for commodity conversions)
    pub cost: Option<Amount>,
    /// Transaction flags
    pub flags: TransactionFlags,
    /// Free-text note
    pub note: String,
}

impl Transaction {
    /// Create a transaction posting `amount` to `account`
    pub fn new(account: AccountRef, amount: Amount) -> Self {
        Self {
            account,
            amount,
            cost: None,
            flags: TransactionFlags::default(),
            note: String::new(),
        }
    }

    /// Set the cost of this transaction
    pub fn with_cost(mut self, cost: Amount) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Set the note of this transaction
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    /// Add flags to this transaction
    pub fn with_flags(mut self, flags: TransactionFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Check if transaction is virtual (enclosed in parentheses)
    pub fn is_virtual(&self) -> bool {
        self.flags.contains(TransactionFlags::VIRTUAL)
    }

    /// Check if transaction must balance in its entry
    pub fn must_balance(&self) -> bool {
        !self.is_virtual() || self.flags.contains(TransactionFlags::BALANCE)
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let account = self.account.borrow().fullname();
        match (self.is_virtual(), self.flags.contains(TransactionFlags::BALANCE)) {
            (true, true) => write!(f, "[{account}]")?,
            (true, false) => write!(f, "({account})")?,
            _ => write!(f, "{account}")?,
        }
        write!(f, "  {}", self.amount)?;
        if let Some(cost) = &self.cost {
            write!(f, " @ {cost}")?;
        }
        if !self.note.is_empty() {
            write!(f, "  ; {}", self.note)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{find_account, Account};

    #[test]
    fn test_flags_and_balance_rules() {
        let root = Account::new_root("").into_ref();
        let cash = find_account(&root, "Assets:Cash", true).unwrap();

        let real = Transaction::new(cash.clone(), Amount::from_i64(5));
        assert!(real.must_balance());

        let virt = Transaction::new(cash.clone(), Amount::from_i64(5))
            .with_flags(TransactionFlags::VIRTUAL);
        assert!(!virt.must_balance());

        let balanced = virt.with_flags(TransactionFlags::BALANCE);
        assert!(balanced.must_balance());
        assert_eq!(balanced.to_string(), "[Assets:Cash]  5");
    }

    #[test]
    fn test_display_with_cost_and_note() {
        let root = Account::new_root("").into_ref();
        let broker = find_account(&root, "Assets:Broker", true).unwrap();
        let txn = Transaction::new(broker, Amount::from_i64(10))
            .with_cost(Amount::from_i64(30))
            .with_note("lot A");
        assert_eq!(txn.to_string(), "Assets:Broker  10 @ 30  ; lot A");
    }
}
