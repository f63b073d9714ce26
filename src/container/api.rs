//! Public API for the container capability
//!
//! External modules should import from here rather than directly from the
//! internal modules.

// Container and its configuration
pub use crate::container::config::{CacheLevel, ContainerConfig};
pub use crate::container::manager::{
    ContainerDiagnostics, ContainerState, MessageContainer, MessageContainerBuilder,
};

// Extension points
pub use crate::container::executor::{BlockingTaskExecutor, ExecutorError, Task, TaskExecutor};
pub use crate::container::monitor::{
    ChannelMonitor, ContainerMonitor, LogMonitor, MonitorEvent, MonitorEventType,
};
pub use crate::container::traits::{ExceptionListener, MessageHandler};

// Units of work and connection handling
pub use crate::container::connection::ConnectionManager;
pub use crate::container::unit_of_work::UnitOfWork;

// Statistics
pub use crate::container::statistics::{ContainerStatistics, StatisticsSnapshot};

// Error handling
pub use crate::container::error::{ContainerError, ContainerResult, HandlerError, WorkError};
