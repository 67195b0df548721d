use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use serde::Deserialize;

pub type NodeId = usize;
pub type LinkId = usize;
pub type NetId = usize;
pub type CacheId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write)
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Read => write!(f, "read"),
            AccessKind::Write => write!(f, "write"),
        }
    }
}

/// Bank of a cache, selected by `block_index % bank_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BankIndex(pub usize);

impl BankIndex {
    pub fn for_block(block_index: u64, bank_count: usize) -> Self {
        debug_assert!(bank_count > 0);
        BankIndex((block_index % bank_count as u64) as usize)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for BankIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a port within its owner (a cache bank's read or write ports, or a network node's
/// input or output ports).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PortIndex(pub usize);

impl PortIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for PortIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Completion counter shared between the issuer of an access and the timing model.  The model
/// bumps it exactly once per logically completed access, coalesced accesses included.
#[derive(Debug, Clone, Default)]
pub struct Witness(Rc<Cell<u64>>);

impl Witness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.0.get()
    }

    pub(crate) fn bump(&self) {
        self.0.set(self.0.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn witness_clones_share_the_counter() {
        let w = Witness::new();
        let issued = w.clone();
        w.bump();
        w.bump();
        assert_eq!(2, issued.get());
    }

    #[test]
    fn bank_index_wraps_block_index() {
        assert_eq!(BankIndex(0), BankIndex::for_block(8, 4));
        assert_eq!(BankIndex(3), BankIndex::for_block(7, 4));
        assert_eq!(BankIndex(0), BankIndex::for_block(123, 1));
    }
}
