//! Tool registration and execution for model-requested function calls.

mod args;
mod error;
mod registry;
mod tool;

pub use args::{parse_json_object, parse_json_value, required_string};
pub use error::{ToolError, ToolErrorKind};
pub use registry::ToolRegistry;
pub use tool::{FunctionTool, Tool, ToolFuture};
