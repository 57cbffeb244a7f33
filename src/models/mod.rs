pub mod automation_job;
pub mod candidate;
pub mod candidate_match;
pub mod conversation;
pub mod outreach;
pub mod request;
