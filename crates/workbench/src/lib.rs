pub mod context;
pub mod template;
pub mod workbench;

pub use context::{ContextKind, ContextRecord, SessionSummary, WorkbenchContext};
pub use template::{build_meta_prompt, DEFAULT_GOAL, DEFAULT_META_PROMPT_TEMPLATE, META_PROMPT_ROLE};
pub use workbench::Workbench;
