pub mod announcements;
pub mod auth;
pub mod error;
pub mod groups;
pub mod invite;
pub mod middleware;
pub mod polls;
pub mod reactions;
pub mod storage;

mod timestamps;
