//! Unit-of-work boundaries around one receive/dispatch cycle
//!
//! The variant is chosen once from the session mode when the container is
//! built. Auto and dups-ok acknowledgement share the no-op variant since the
//! broker settles those messages on delivery.

use crate::broker::api::{
    BrokerError, Message, Session, SessionMode, TransactionManager, TransactionStatus,
};
use crate::container::error::WorkError;
use crate::container::statistics::ContainerStatistics;
use std::sync::Arc;

#[derive(Clone)]
pub enum UnitOfWork {
    AutoAcknowledge,
    ClientAcknowledge,
    LocalTransaction {
        statistics: Arc<ContainerStatistics>,
    },
    GlobalTransaction {
        manager: Arc<dyn TransactionManager>,
        timeout_secs: u32,
        statistics: Arc<ContainerStatistics>,
    },
}

impl UnitOfWork {
    /// Pick the variant for `mode`; global mode needs a transaction manager
    pub fn for_session_mode(
        mode: SessionMode,
        statistics: Arc<ContainerStatistics>,
        transaction_manager: Option<Arc<dyn TransactionManager>>,
        timeout_secs: u32,
    ) -> Option<Self> {
        Some(match mode {
            SessionMode::AutoAcknowledge | SessionMode::DupsOkAcknowledge => {
                UnitOfWork::AutoAcknowledge
            }
            SessionMode::ClientAcknowledge => UnitOfWork::ClientAcknowledge,
            SessionMode::Transacted => UnitOfWork::LocalTransaction { statistics },
            SessionMode::Global => UnitOfWork::GlobalTransaction {
                manager: transaction_manager?,
                timeout_secs,
                statistics,
            },
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            UnitOfWork::AutoAcknowledge => "auto-acknowledge",
            UnitOfWork::ClientAcknowledge => "client-acknowledge",
            UnitOfWork::LocalTransaction { .. } => "local-transaction",
            UnitOfWork::GlobalTransaction { .. } => "global-transaction",
        }
    }

    pub fn begin(&self) -> Result<(), WorkError> {
        if let UnitOfWork::GlobalTransaction {
            manager,
            timeout_secs,
            ..
        } = self
        {
            manager
                .set_timeout(*timeout_secs)
                .and_then(|_| manager.begin())
                .map_err(|source| WorkError::Begin { source })?;
        }
        Ok(())
    }

    /// Settle the work; `message` is `None` when the receive timed out
    pub fn end(&self, session: &dyn Session, message: Option<&Message>) -> Result<(), WorkError> {
        let end = |source: BrokerError| WorkError::End { source };
        match self {
            UnitOfWork::AutoAcknowledge => Ok(()),
            UnitOfWork::ClientAcknowledge => match message {
                Some(message) => session.acknowledge(message).map_err(end),
                None => Ok(()),
            },
            UnitOfWork::LocalTransaction { statistics } => {
                if message.is_none() {
                    return Ok(());
                }
                session.commit().map_err(end)?;
                statistics.increment_committed();
                Ok(())
            }
            // The transaction was begun regardless of the receive outcome,
            // so it is always completed here.
            UnitOfWork::GlobalTransaction {
                manager,
                statistics,
                ..
            } => {
                if manager.status().map_err(end)? == TransactionStatus::MarkedRollback {
                    manager.rollback().map_err(end)?;
                    statistics.increment_rolled_back();
                } else {
                    manager.commit().map_err(end)?;
                    if message.is_some() {
                        statistics.increment_committed();
                    }
                }
                Ok(())
            }
        }
    }

    /// Abort the work; `session` is `None` when it was never created
    pub fn rollback(&self, session: Option<&dyn Session>) -> Result<(), WorkError> {
        let rollback = |source: BrokerError| WorkError::Rollback { source };
        match self {
            UnitOfWork::AutoAcknowledge => Ok(()),
            UnitOfWork::ClientAcknowledge => match session {
                Some(session) => session.recover().map_err(rollback),
                None => Ok(()),
            },
            UnitOfWork::LocalTransaction { statistics } => match session {
                Some(session) => {
                    session.rollback().map_err(rollback)?;
                    statistics.increment_rolled_back();
                    Ok(())
                }
                None => Ok(()),
            },
            UnitOfWork::GlobalTransaction {
                manager,
                statistics,
                ..
            } => {
                let status = manager.status().map_err(rollback)?;
                if matches!(
                    status,
                    TransactionStatus::Active | TransactionStatus::MarkedRollback
                ) {
                    manager.rollback().map_err(rollback)?;
                    statistics.increment_rolled_back();
                }
                Ok(())
            }
        }
    }
}
