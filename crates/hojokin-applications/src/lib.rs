pub mod db;
pub mod error;
pub mod export;
pub mod manager;
pub mod programs;
pub mod templates;
pub mod types;

pub use error::ApplicationError;
pub use manager::{ApplicationManager, Caller};
pub use templates::TemplateStore;
pub use types::{
    Application, ApplicationUpdate, GeneratedContent, GeneratedSection, NewApplication,
    NewTemplate, SectionSpec, SubsidyProgram, Template, TemplateUpdate,
};
