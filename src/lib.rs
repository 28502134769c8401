pub mod advice;
pub mod archive;
pub mod captcha;
pub mod config;
pub mod constants;
pub mod profile;
pub mod submission;
pub mod web_server;

pub use config::Settings;
pub use profile::UserProfile;
pub use submission::{Outcome, SubmissionPipeline};
