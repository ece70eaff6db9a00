// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

//! Transaction identifier types.

/// Thin wrapper around a transaction identifier.
///
/// The store issues monotonically increasing identifiers via
/// [`crate::Store::begin`] and [`crate::Store::begin_optimistic`].
///
/// # Invariants
/// - Zero (`TxId(0)`) is reserved as invalid; the store never returns it.
/// - An id is live from `begin*` until the matching `commit`/`abort`; using
///   it afterwards returns [`crate::StoreError::UnknownTx`].
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct TxId(u64);

impl TxId {
    /// Constructs a `TxId` from a raw `u64` value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for TxId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a transaction's writes land on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxKind {
    /// Server data: reads and writes the base source.
    Server,
    /// Optimistic update: reads the visible state, commits into a new layer.
    Optimistic,
}

/// Handle identifying a committed optimistic layer.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct OptimisticUpdateId(u64);

impl OptimisticUpdateId {
    pub(crate) const fn from_tx(tx: TxId) -> Self {
        Self(tx.value())
    }

    /// Returns the underlying raw value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for OptimisticUpdateId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "optimistic:{}", self.0)
    }
}
