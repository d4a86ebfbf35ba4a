//! Typed tool catalogue
//!
//! Every capability the assistant may invoke is a [`ToolName`]; its validated arguments
//! form a [`ToolAction`]. Declarations sent to the backend are generated from the same
//! argument types, so schema and validation never drift apart.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Application views the assistant can navigate to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum View {
    Dashboard,
    Estimator,
    Jobs,
    Suppliers,
    Compliance,
    Profile,
    JobsMap,
    Documents,
}

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum JobStatus {
    Estimate,
    Quoted,
    #[serde(rename = "In Progress")]
    InProgress,
    Complete,
    Invoiced,
    Archived,
}

/// Documents that can be generated for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DocumentType {
    Quote,
    #[serde(rename = "RAMS")]
    Rams,
    Programme,
    Email,
    Invoice,
}

/// Profile image slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Logo,
    Banner,
}

/// Social network for profile links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SocialPlatform {
    Linkedin,
    Facebook,
    Twitter,
    Instagram,
}

/// Kind of promotional post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Text,
    Image,
    Video,
}

/// Requested length of generated post content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PostLength {
    Short,
    Medium,
    Long,
}

/// Requested tone of generated post content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PostTone {
    Professional,
    Friendly,
    Urgent,
}

/// Supplier grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum SupplierCategory {
    Materials,
    Subcontractor,
    #[serde(rename = "Plant Hire")]
    PlantHire,
    Other,
}

/// Editable text fields of the company profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ProfileField {
    Name,
    Company,
    Specialization,
    Slogan,
    Location,
    Email,
    Phone,
    Website,
    ServiceArea,
    AboutUs,
}

/// Replace the current project's notes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectNotesArgs {
    /// New notes text
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NavigateArgs {
    /// View to open
    pub view: View,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileFieldArgs {
    /// Field to change
    pub field_name: ProfileField,
    /// New value
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificationArgs {
    /// Certification name, e.g. "CSCS Gold Card"
    pub certification: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SocialLinkArgs {
    /// Social network
    pub platform: SocialPlatform,
    /// Full profile URL
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProfileImageArgs {
    /// Which image to produce
    #[serde(rename = "type")]
    pub kind: ImageKind,
    /// Description of the image
    pub prompt: String,
    /// Visual style, e.g. "minimalist"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Colour palette
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromotionalPostArgs {
    /// What the post should promote
    pub user_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<PostLength>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<PostTone>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PostImageArgs {
    /// Description of the image to generate
    pub image_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddPostArgs {
    /// Kind of post
    #[serde(rename = "type")]
    pub kind: PostKind,
    /// Post body
    pub content: String,
    /// Post caption
    pub caption: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusArgs {
    /// Job name or number
    pub job_identifier: String,
    /// New status
    pub status: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddTaskArgs {
    /// Job name or number
    pub job_identifier: String,
    /// Task description
    pub text: String,
    /// Due date as YYYY-MM-DD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Person responsible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobTaskArgs {
    /// Job name or number
    pub job_identifier: String,
    /// Text of the existing task
    pub task_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobDocumentArgs {
    /// Job name or number
    pub job_identifier: String,
    /// Document to produce
    pub document_type: DocumentType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobArgs {
    /// Job name or number
    pub job_identifier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddSupplierArgs {
    pub name: String,
    pub category: SupplierCategory,
    pub contact_person: String,
    pub phone: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SupplierArgs {
    /// Supplier name
    pub supplier_identifier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistArgs {
    /// Checklist id
    pub checklist_id: String,
}

/// Arguments of a tool that takes none
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct NoArgs {}

macro_rules! catalogue {
    ($( $variant:ident($args:ty) => $name:literal, $description:literal; )+) => {
        /// Name of a capability the assistant may call
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ToolName {
            $( $variant, )+
        }

        impl ToolName {
            /// Every tool, in catalogue order
            pub const ALL: &'static [Self] = &[ $( Self::$variant, )+ ];

            /// Wire name used by the backend
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $name, )+
                }
            }

            /// Description shown to the model
            #[must_use]
            pub const fn description(self) -> &'static str {
                match self {
                    $( Self::$variant => $description, )+
                }
            }

            /// JSON schema of the tool's arguments
            #[must_use]
            pub fn parameters(self) -> Value {
                match self {
                    $( Self::$variant => parameters_schema::<$args>(), )+
                }
            }
        }

        impl FromStr for ToolName {
            type Err = UnknownTool;

            fn from_str(name: &str) -> Result<Self, Self::Err> {
                match name {
                    $( $name => Ok(Self::$variant), )+
                    _ => Err(UnknownTool(name.to_string())),
                }
            }
        }

        /// A validated tool invocation
        #[derive(Debug, Clone, PartialEq)]
        pub enum ToolAction {
            $( $variant($args), )+
        }

        impl ToolAction {
            /// Validate raw call arguments against the tool's argument type
            ///
            /// # Errors
            ///
            /// Returns error if a required argument is missing or has the wrong shape
            pub fn parse(name: ToolName, args: Map<String, Value>) -> Result<Self, serde_json::Error> {
                let args = Value::Object(args);
                Ok(match name {
                    $( ToolName::$variant => Self::$variant(serde_json::from_value(args)?), )+
                })
            }

            /// Tool this action invokes
            #[must_use]
            pub const fn name(&self) -> ToolName {
                match self {
                    $( Self::$variant(_) => ToolName::$variant, )+
                }
            }
        }
    };
}

catalogue! {
    UpdateProjectNotes(ProjectNotesArgs) => "updateProjectNotes",
        "Replace the notes of the project currently open in the estimator.";
    NavigateToView(NavigateArgs) => "navigateToView",
        "Open one of the application's main views.";
    ListCapabilities(NoArgs) => "listCapabilities",
        "Describe what the assistant can do.";
    UpdateProfileField(ProfileFieldArgs) => "updateProfileField",
        "Change a single text field of the company profile.";
    AddCertification(CertificationArgs) => "addCertification",
        "Add a certification or accreditation to the profile.";
    RemoveCertification(CertificationArgs) => "removeCertification",
        "Remove a certification from the profile.";
    AddSocialLink(SocialLinkArgs) => "addSocialLink",
        "Add or replace a social media link on the profile.";
    GenerateAboutUsContent(NoArgs) => "generateAboutUsContent",
        "Write an 'About Us' section from the current profile.";
    GenerateProfileImage(ProfileImageArgs) => "generateProfileImage",
        "Generate a new logo or banner image.";
    EditProfileImage(ProfileImageArgs) => "editProfileImage",
        "Edit the existing logo or banner image.";
    GeneratePromotionalPostContent(PromotionalPostArgs) => "generatePromotionalPostContent",
        "Draft the text of a promotional social media post.";
    GeneratePostImage(PostImageArgs) => "generatePostImage",
        "Generate an image for the promotional post being drafted.";
    GeneratePostCaption(NoArgs) => "generatePostCaption",
        "Write a caption for the promotional post being drafted.";
    AddPost(AddPostArgs) => "addPost",
        "Publish a post to the company profile.";
    UpdateJobStatus(JobStatusArgs) => "updateJobStatus",
        "Move a job to a new status.";
    AddTaskToJob(AddTaskArgs) => "addTaskToJob",
        "Add a task to a job's task list.";
    CompleteJobTask(JobTaskArgs) => "completeJobTask",
        "Mark a task on a job as complete.";
    DeleteJobTask(JobTaskArgs) => "deleteJobTask",
        "Delete a task from a job.";
    GenerateJobDocument(JobDocumentArgs) => "generateJobDocument",
        "Generate a document such as a quote or RAMS for a job.";
    ViewJob(JobArgs) => "viewJob",
        "Open a job's detail view.";
    DeleteJob(JobArgs) => "deleteJob",
        "Delete a job.";
    AddSupplier(AddSupplierArgs) => "addSupplier",
        "Add a supplier to the supplier directory.";
    DeleteSupplier(SupplierArgs) => "deleteSupplier",
        "Delete a supplier from the directory.";
    ViewChecklist(ChecklistArgs) => "viewChecklist",
        "Open a compliance checklist.";
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool name outside the catalogue
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tool: {0}")]
pub struct UnknownTool(pub String);

/// Declaration of one callable function, as sent to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl From<ToolName> for FunctionDeclaration {
    fn from(tool: ToolName) -> Self {
        Self {
            name: tool.as_str().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters(),
        }
    }
}

/// Group of declarations in the backend's `tools` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDeclarations {
    pub function_declarations: Vec<FunctionDeclaration>,
}

/// Inline JSON schema for an argument type, without keys the backend rejects
fn parameters_schema<T: JsonSchema>() -> Value {
    let schema = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.option_add_null_type = false;
            s.meta_schema = None;
        })
        .into_generator()
        .into_root_schema_for::<T>();

    match serde_json::to_value(schema) {
        Ok(Value::Object(mut obj)) => {
            obj.remove("title");
            obj.remove("definitions");
            Value::Object(obj)
        }
        Ok(other) => other,
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize tool schema");
            serde_json::json!({ "type": "object" })
        }
    }
}
