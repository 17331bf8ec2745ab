//! Domain model: validation statuses, the session record tree, and the
//! project configuration the engine executes against.

pub mod config;
pub mod record;
pub mod status;
pub mod value;

pub use config::{
    ExecutionFlags, ExecutionRequest, GroupConfig, LogSearchPeriod, PageConfig, ParameterConfig,
    ProjectConfig, TabConfig, TimeoutRange,
};
pub use record::{
    PageRecord, ParameterPath, ParameterRecord, SessionId, SessionRecord, TabRecord,
    ValidationInfo, COMMON_TAB,
};
pub use status::ValidationStatus;
pub use value::{ActualValue, VariableValue};
