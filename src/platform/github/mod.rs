mod client;
pub mod mapper;

pub use client::{pick_pull_request, GitHubHost};
