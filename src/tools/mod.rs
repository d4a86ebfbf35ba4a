//! Tool management for the assistant session
//!
//! The backend answers with function calls; these are validated against a closed
//! catalogue and executed sequentially by the [`ToolDispatcher`].

mod catalogue;
mod dispatcher;
mod registry;

pub use catalogue::{
    AddPostArgs, AddSupplierArgs, AddTaskArgs, CertificationArgs, ChecklistArgs, DocumentType,
    FunctionDeclaration, ImageKind, JobArgs, JobDocumentArgs, JobStatus, JobStatusArgs,
    JobTaskArgs, NavigateArgs, NoArgs, PostImageArgs, PostKind, PostLength, PostTone,
    ProfileField, ProfileFieldArgs, ProfileImageArgs, ProjectNotesArgs, PromotionalPostArgs,
    SocialLinkArgs, SocialPlatform, SupplierArgs, SupplierCategory, ToolAction, ToolDeclarations,
    ToolName, UnknownTool, View,
};
pub use dispatcher::{DispatchReport, ToolCall, ToolDispatcher, ToolFailure, ToolResult};
pub use registry::{ToolFuture, ToolHandler, ToolRegistry};
