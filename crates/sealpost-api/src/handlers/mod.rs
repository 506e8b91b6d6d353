pub mod download;
pub mod root;
pub mod upload;
