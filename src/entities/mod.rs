pub mod file;
pub mod job_execution;
pub mod login_session;
pub mod resource;
pub mod resource_assignment;
pub mod resource_log;

pub use file::Entity as File;
pub use job_execution::Entity as JobExecution;
pub use login_session::Entity as LoginSession;
pub use resource::Entity as Resource;
pub use resource_assignment::Entity as ResourceAssignment;
pub use resource_log::Entity as ResourceLog;
