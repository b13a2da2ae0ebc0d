// Position accounting and signal-driven execution
pub mod coordinator;
pub mod metrics;
pub mod position;

pub use coordinator::{
    CoordinatorSnapshot, ExecutionCoordinator, ExecutionError, ExitReason, RejectReason, TradeEvent,
};
pub use metrics::{SessionMetrics, TradeRecord};
pub use position::{
    CloseError, CloseResult, OpenError, PartialClose, Position, PositionValue, TrailingState,
    MIN_ORDER_SIZE,
};
