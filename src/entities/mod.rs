pub mod chat;
pub mod upload;
pub mod upload_share;
pub mod user;
