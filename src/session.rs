//! Deposit session contract
//!
//! A session is one all-or-nothing unit of work against a repository. The
//! walker and the manager only ever talk to a repository through this trait;
//! HTTP, authentication and server-side transactions live in the adapters
//! ([`crate::ldp`], [`crate::memory`]).

use std::fmt;

use crate::diff::GraphDiff;
use crate::error::DepositError;
use crate::graph::Graph;
use crate::resource::{DepositedRecord, ResourceNode};

/// Opaque optimistic-concurrency token returned by [`DepositSession::fetch_graph`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConcurrencyToken(pub String);

impl ConcurrencyToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transactional access to a repository for a single package deposit
///
/// Every call may block on the network. Implementations must reject
/// `deposit`, `fetch_graph` and `apply_patch` once the session has been
/// committed or rolled back ([`DepositError::IllegalState`]).
pub trait DepositSession {
    /// Create `node` as a child of `parent_uri`
    ///
    /// A binary's description is written as part of the same call and its
    /// URI returned in the record. Failure leaves the session usable.
    fn deposit(
        &mut self,
        node: &ResourceNode,
        parent_uri: &str,
    ) -> Result<DepositedRecord, DepositError>;

    /// Current graph of a deposited resource and its concurrency token
    fn fetch_graph(&mut self, uri: &str) -> Result<(Graph, ConcurrencyToken), DepositError>;

    /// Apply a minimal diff; an empty diff must not reach the repository
    ///
    /// Fails with [`DepositError::ConcurrentModification`] if `token` is stale.
    fn apply_patch(
        &mut self,
        uri: &str,
        patch: &GraphDiff,
        token: &ConcurrencyToken,
    ) -> Result<(), DepositError>;

    /// Make every operation of this session visible at once
    fn commit(&mut self) -> Result<(), DepositError>;

    /// Discard every operation of this session
    fn rollback(&mut self) -> Result<(), DepositError>;
}

/// Opens one session per deposit
pub trait SessionFactory {
    type Session: DepositSession;

    fn open(&self) -> Result<Self::Session, DepositError>;
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Active,
    Committed,
    RolledBack,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Active => "active",
            SessionState::Committed => "committed",
            SessionState::RolledBack => "rolled back",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, SessionState::Committed | SessionState::RolledBack)
    }

    /// Guard for `deposit`, `fetch_graph` and `apply_patch`; moves Idle to Active
    pub fn enter_operation(&mut self, operation: &'static str) -> Result<(), DepositError> {
        if self.is_finished() {
            return Err(DepositError::IllegalState {
                operation,
                state: self.as_str(),
            });
        }
        *self = SessionState::Active;
        Ok(())
    }

    /// Guard for `commit` and `rollback`
    ///
    /// Finishing an idle session is allowed (an empty package commits
    /// nothing); finishing twice is not.
    pub fn check_finish(&self, operation: &'static str) -> Result<(), DepositError> {
        if self.is_finished() {
            return Err(DepositError::IllegalState {
                operation,
                state: self.as_str(),
            });
        }
        Ok(())
    }

    pub fn finish(&mut self, committed: bool) {
        *self = if committed {
            SessionState::Committed
        } else {
            SessionState::RolledBack
        };
    }
}
