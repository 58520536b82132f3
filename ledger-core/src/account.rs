//! Hierarchical account structure with parent-child relationships
//!
//! Accounts form a tree rooted at the journal's master account. Children are
//! held in name order so that every traversal of the tree is deterministic.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use compact_str::CompactString;

/// Account name component (without path)
pub type AccountName = CompactString;

/// Account reference type for shared ownership
pub type AccountRef = Rc<RefCell<Account>>;
/// Weak account reference to prevent reference cycles
pub type WeakAccountRef = Weak<RefCell<Account>>;

/// Separator between account name components in a full path
pub const ACCOUNT_SEPARATOR: char = ':';

/// Core Account structure representing a node in the account hierarchy
#[derive(Debug)]
pub struct Account {
    /// Account name (without path)
    pub name: AccountName,
    /// Parent account (weak reference to prevent cycles)
    pub parent: Option<WeakAccountRef>,
    /// Child accounts keyed and ordered by name
    pub children: BTreeMap<AccountName, AccountRef>,
    /// Distance from the tree root (0 for the root itself)
    pub depth: u16,
    /// Identifier from the cache image this account was loaded from, 0 otherwise.
    /// Only meaningful within that one image.
    pub ident: u32,
    /// Optional account note/description
    pub note: Option<String>,
}

impl Account {
    /// Create a new account with the specified name and parent
    pub fn new(name: impl Into<AccountName>, parent: Option<&AccountRef>) -> Self {
        let depth = parent.map_or(0, |p| p.borrow().depth.saturating_add(1));
        Self {
            name: name.into(),
            parent: parent.map(Rc::downgrade),
            children: BTreeMap::new(),
            depth,
            ident: 0,
            note: None,
        }
    }

    /// Create a root account (no parent)
    pub fn new_root(name: impl Into<AccountName>) -> Self {
        Self::new(name, None)
    }

    /// Wrap this account in a shared reference
    pub fn into_ref(self) -> AccountRef {
        Rc::new(RefCell::new(self))
    }

    /// Get the account's simple name (without path)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the parent account, if it is still alive
    pub fn parent(&self) -> Option<AccountRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// Add a child account to this account, replacing any child of the same name
    pub fn add_child(&mut self, child: AccountRef) {
        let child_name = child.borrow().name.clone();
        self.children.insert(child_name, child);
    }

    /// Find a direct child by name
    pub fn child(&self, name: &str) -> Option<AccountRef> {
        self.children.get(name).cloned()
    }

    /// Check if this is the root account
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Number of direct children
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Check if this account has no children
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of accounts in this subtree, this one included
    pub fn subtree_size(&self) -> usize {
        1 + self.children.values().map(|c| c.borrow().subtree_size()).sum::<usize>()
    }

    /// Get the full account name (e.g., "Assets:Bank:Checking")
    ///
    /// The root's own name never appears in a full name.
    pub fn fullname(&self) -> String {
        match self.parent() {
            Some(parent) => {
                let parent_name = parent.borrow().fullname();
                if parent_name.is_empty() {
                    self.name.to_string()
                } else {
                    format!("{parent_name}{ACCOUNT_SEPARATOR}{}", self.name)
                }
            }
            None => String::new(),
        }
    }

    /// Depth-first (pre-order) traversal of the accounts below this one
    pub fn depth_first_iter(&self) -> DepthFirstIterator {
        DepthFirstIterator::new(self)
    }
}

/// Find an account by colon-separated path below `root`, optionally creating it
pub fn find_account(root: &AccountRef, path: &str, auto_create: bool) -> Option<AccountRef> {
    let mut current = root.clone();
    for component in path.split(ACCOUNT_SEPARATOR).filter(|c| !c.is_empty()) {
        let existing = current.borrow().child(component);
        let next = match existing {
            Some(child) => child,
            None if auto_create => {
                let child = Account::new(component, Some(&current)).into_ref();
                current.borrow_mut().add_child(child.clone());
                child
            }
            None => return None,
        };
        current = next;
    }
    Some(current)
}

/// Depth-first iterator for account traversal
pub struct DepthFirstIterator {
    stack: Vec<AccountRef>,
}

impl DepthFirstIterator {
    fn new(root_account: &Account) -> Self {
        // children go on the stack in reverse so they pop in name order
        let stack = root_account.children.values().rev().cloned().collect();
        Self { stack }
    }
}

impl Iterator for DepthFirstIterator {
    type Item = AccountRef;

    fn next(&mut self) -> Option<Self::Item> {
        let account_ref = self.stack.pop()?;
        self.stack.extend(account_ref.borrow().children.values().rev().cloned());
        Some(account_ref)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fullname())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_account_creates_intermediate_accounts() {
        let root = Account::new_root("").into_ref();
        let checking = find_account(&root, "Assets:Bank:Checking", true).unwrap();

        assert_eq!(checking.borrow().fullname(), "Assets:Bank:Checking");
        assert_eq!(checking.borrow().depth, 3);
        assert_eq!(root.borrow().subtree_size(), 4);

        let bank = find_account(&root, "Assets:Bank", false).unwrap();
        assert!(Rc::ptr_eq(&bank, &checking.borrow().parent().unwrap()));
        assert!(find_account(&root, "Expenses", false).is_none());
    }

    #[test]
    fn test_empty_path_is_root() {
        let root = Account::new_root("").into_ref();
        let found = find_account(&root, "", false).unwrap();
        assert!(Rc::ptr_eq(&found, &root));
        assert_eq!(root.borrow().fullname(), "");
    }

    #[test]
    fn test_depth_first_is_preorder_by_name() {
        let root = Account::new_root("").into_ref();
        find_account(&root, "Expenses:Food", true);
        find_account(&root, "Assets:Cash", true);
        find_account(&root, "Assets:Bank", true);

        let names: Vec<String> =
            root.borrow().depth_first_iter().map(|a| a.borrow().fullname()).collect();
        assert_eq!(
            names,
            vec!["Assets", "Assets:Bank", "Assets:Cash", "Expenses", "Expenses:Food"]
        );
    }

    #[test]
    fn test_leaf_and_child_counts() {
        let root = Account::new_root("").into_ref();
        let food = find_account(&root, "Expenses:Food", true).unwrap();
        assert!(food.borrow().is_leaf());
        assert!(root.borrow().is_root());
        assert_eq!(root.borrow().child_count(), 1);
    }
}
