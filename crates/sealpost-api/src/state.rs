//! Application state shared by every handler.

use sealpost_core::Config;
use sealpost_upload::Uploader;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub uploader: Uploader,
}

impl AppState {
    pub fn new(config: Config, uploader: Uploader) -> Self {
        AppState { config, uploader }
    }
}
