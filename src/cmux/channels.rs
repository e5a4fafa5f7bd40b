//! # Channel Table
//!
//! Open/closed state for DLCIs 1..=63. DLCI 0 is the multiplexer control
//! channel and has no entry here.

use super::protocol::{Dlci, MAX_CHANNEL};

const TABLE_LEN: usize = MAX_CHANNEL as usize;

/// Set of open channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTable {
    open: [bool; TABLE_LEN],
}

impl ChannelTable {
    pub fn new() -> Self {
        Self {
            open: [false; TABLE_LEN],
        }
    }

    fn slot(dlci: Dlci) -> usize {
        usize::from(dlci.get()) - 1
    }

    pub fn is_open(&self, dlci: Dlci) -> bool {
        self.open[Self::slot(dlci)]
    }

    /// Mark open, returning false if it already was
    pub fn mark_open(&mut self, dlci: Dlci) -> bool {
        !std::mem::replace(&mut self.open[Self::slot(dlci)], true)
    }

    /// Mark closed, returning false if it already was
    pub fn mark_closed(&mut self, dlci: Dlci) -> bool {
        std::mem::replace(&mut self.open[Self::slot(dlci)], false)
    }

    /// Open channels in ascending order
    pub fn open_channels(&self) -> impl Iterator<Item = Dlci> + '_ {
        Dlci::all().filter(|&dlci| self.is_open(dlci))
    }

    pub fn open_count(&self) -> usize {
        self.open.iter().filter(|&&open| open).count()
    }

    pub fn clear(&mut self) {
        self.open = [false; TABLE_LEN];
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dlci(n: u8) -> Dlci {
        Dlci::new(n).unwrap()
    }

    #[test]
    fn test_new_table_is_empty() {
        let table = ChannelTable::new();
        assert_eq!(table.open_count(), 0);
        assert!(Dlci::all().all(|d| !table.is_open(d)));
    }

    #[test]
    fn test_mark_open_is_idempotent() {
        let mut table = ChannelTable::new();
        assert!(table.mark_open(dlci(1)));
        assert!(!table.mark_open(dlci(1)));
        assert!(table.is_open(dlci(1)));
        assert_eq!(table.open_count(), 1);
    }

    #[test]
    fn test_mark_closed() {
        let mut table = ChannelTable::new();
        assert!(!table.mark_closed(dlci(5)));

        table.mark_open(dlci(5));
        assert!(table.mark_closed(dlci(5)));
        assert!(!table.is_open(dlci(5)));
    }

    #[test]
    fn test_open_channels_ascending() {
        let mut table = ChannelTable::new();
        for n in [63, 2, 40, 1] {
            table.mark_open(dlci(n));
        }

        let open: Vec<u8> = table.open_channels().map(Dlci::get).collect();
        assert_eq!(open, vec![1, 2, 40, 63]);
    }

    #[test]
    fn test_clear() {
        let mut table = ChannelTable::new();
        table.mark_open(dlci(1));
        table.mark_open(dlci(63));
        table.clear();
        assert_eq!(table.open_count(), 0);
    }
}
