// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Configuration for the transaction manager.

/// Default number of tuples per cleanup batch.
pub const STANDARD_VECTOR_SIZE: usize = 1024;

/// Configuration for [`TransactionManager`](super::TransactionManager).
#[derive(Debug, Clone)]
pub struct TxnConfig {
    /// Maximum number of row ids buffered before the cleanup pass issues an
    /// index removal.
    pub cleanup_batch_size: usize,
    /// Run garbage collection after every commit.
    pub cleanup_on_commit: bool,
}

impl Default for TxnConfig {
    fn default() -> Self {
        Self {
            cleanup_batch_size: STANDARD_VECTOR_SIZE,
            cleanup_on_commit: true,
        }
    }
}

impl TxnConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cleanup batch size. Zero is treated as one.
    pub fn with_cleanup_batch_size(mut self, size: usize) -> Self {
        self.cleanup_batch_size = size.max(1);
        self
    }

    /// Enables or disables garbage collection after each commit.
    pub fn with_cleanup_on_commit(mut self, enabled: bool) -> Self {
        self.cleanup_on_commit = enabled;
        self
    }

    /// Returns the effective batch size.
    #[inline]
    pub(crate) fn batch_size(&self) -> usize {
        self.cleanup_batch_size.max(1)
    }
}
