mod entity;
mod record;
mod status;

pub use entity::{Job, JobId, JobType};
pub use record::JobRecord;
pub use status::JobStatus;
