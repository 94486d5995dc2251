pub mod structured_logging;

pub use structured_logging::{
    init_structured_logging,
    init_test_logging,
    ExecutionContext,
    JsonFormatter,
    LoggingConfig,
    OperationTimer,
    PerformanceMetrics,
    StructuredLogEntry,
};
