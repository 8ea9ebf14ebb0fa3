//! Sticky table — component F.
//!
//! Entries live in a stable-index arena (`Vec<Option<Entry>>`) rather than
//! a pointer-linked hash chain, per the "cyclic pointer graphs" redesign
//! note: bucket chains and the LRU list both hold `u32` indices into the
//! same arena instead of raw pointers, so the table is the sole allocator
//! and freer of entries.

mod counter;
mod entry;
mod key;
mod table;

pub use counter::RateCounter;
pub use entry::{CounterBundle, Entry};
pub use key::Key;
pub use table::Table;
