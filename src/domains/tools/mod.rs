//! Tools domain module.
//!
//! Tools are named, parameterized calls to one upstream endpoint. They are
//! described as data and executed by a single pipeline.
//!
//! ## Architecture
//!
//! - `descriptor.rs` - `ToolDescriptor`, parameters and cache policy
//! - `catalog.rs` - The built-in descriptors
//! - `schema.rs` - Argument validation and coercion
//! - `registry.rs` - Name to descriptor lookup
//! - `dispatcher.rs` - resolve → authorize → validate → cache → upstream
//! - `batch.rs` - Bounded fan-out of one tool over many argument sets
//! - `aggregate.rs` - `get_batch_quotes` and `compare_stocks`
//! - `observer.rs` - Per-dispatch records
//! - `router.rs` - rmcp ToolRouter and MCP tool models
//! - `error.rs` - Tool-specific error types
//!
//! ## Adding a New Tool
//!
//! Append a `ToolDescriptor` to `catalog::descriptors()`. Dispatch, schema
//! and routing are derived from it.

pub mod aggregate;
mod batch;
pub mod catalog;
mod descriptor;
mod dispatcher;
mod error;
mod observer;
mod registry;
pub mod router;
pub mod schema;

pub use batch::{BatchCoordinator, BatchItem, BatchResult};
pub use descriptor::{
    CachePolicy, Constraints, EndpointTemplate, ParamKind, ParamLocation, ParamSpec, ParamValue,
    ToolDescriptor, ValidatedParams,
};
pub use dispatcher::{CacheStatus, RequestDispatcher, ToolResponse};
pub use error::{ErrorReport, ToolError};
pub use observer::{DispatchObserver, DispatchRecord, TracingObserver};
pub use registry::{RegistryError, ToolRegistry};
pub use router::{all_tools, build_tool_router, to_call_result};
pub use schema::FieldError;
