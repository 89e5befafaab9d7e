//! Serialization point for multi-table mutations.
//!
//! Every operation that touches more than one queue table runs inside a
//! [`WriteTxn`] obtained from [`Writer::begin`]. In [`WriterMode::Exclusive`]
//! only one `WriteTxn` can be open at a time, which is what SQLite needs: it
//! fails outright when two write transactions overlap. Against Postgres the
//! writer runs in [`WriterMode::Concurrent`] and a `WriteTxn` is just a
//! transaction.
//!
//! Side effects that the database cannot roll back (cache eviction and
//! population) are registered with [`WriteTxn::after_commit`] and only run
//! once the commit has succeeded. Dropping a `WriteTxn` without committing,
//! whether through `?` or because the caller's future was cancelled, rolls
//! the transaction back and discards the hooks.

use sea_orm::{DatabaseBackend, DatabaseConnection, DatabaseTransaction, DbErr, TransactionTrait};
use tokio::sync::{Mutex, MutexGuard};

type Hook = Box<dyn FnOnce() + Send + Sync>;

/// How atomic units are scheduled against the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterMode {
    /// One atomic unit at a time, process wide.
    Exclusive,
    /// Atomic units may overlap; isolation is left to the database.
    Concurrent,
}

impl WriterMode {
    /// SQLite only tolerates a single writer; everything else gets
    /// concurrent transactions.
    pub fn for_backend(backend: DatabaseBackend) -> Self {
        match backend {
            DatabaseBackend::Sqlite => WriterMode::Exclusive,
            _ => WriterMode::Concurrent,
        }
    }
}

/// The single scheduling point every atomic unit of the queue goes
/// through. Shared by all clones of a store.
#[derive(Debug)]
pub struct Writer {
    mode: WriterMode,
    slot: Mutex<()>,
}

impl Writer {
    /// Creates a writer with no unit open.
    pub fn new(mode: WriterMode) -> Self {
        Self {
            mode,
            slot: Mutex::new(()),
        }
    }

    /// The scheduling mode chosen at construction.
    pub fn mode(&self) -> WriterMode {
        self.mode
    }

    /// Opens an atomic unit, waiting for the writer slot first when running
    /// exclusively.
    pub async fn begin(&self, conn: &DatabaseConnection) -> Result<WriteTxn<'_>, DbErr> {
        let guard = match self.mode {
            WriterMode::Exclusive => Some(self.slot.lock().await),
            WriterMode::Concurrent => None,
        };
        let txn = conn.begin().await?;
        Ok(WriteTxn {
            txn,
            hooks: Vec::new(),
            _guard: guard,
        })
    }
}

/// An open atomic unit. See the module docs.
pub struct WriteTxn<'w> {
    txn: DatabaseTransaction,
    hooks: Vec<Hook>,
    _guard: Option<MutexGuard<'w, ()>>,
}

impl WriteTxn<'_> {
    /// The transaction to run table operations against.
    pub fn conn(&self) -> &DatabaseTransaction {
        &self.txn
    }

    /// Queues `hook` to run after a successful commit.
    pub fn after_commit(&mut self, hook: impl FnOnce() + Send + Sync + 'static) {
        self.hooks.push(Box::new(hook));
    }

    /// Commits, then runs the registered hooks in order while the writer
    /// slot is still held.
    pub async fn commit(self) -> Result<(), DbErr> {
        let WriteTxn { txn, hooks, _guard } = self;
        txn.commit().await?;
        for hook in hooks {
            hook();
        }
        Ok(())
    }
}

impl std::fmt::Debug for WriteTxn<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTxn")
            .field("hooks", &self.hooks.len())
            .field("exclusive", &self._guard.is_some())
            .finish()
    }
}
