use std::sync::Arc;

use crate::{config::AppConfig, mailer::EmailSender, records::RecordStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub records: Arc<dyn RecordStore>,
    pub mailer: Arc<dyn EmailSender>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        records: Arc<dyn RecordStore>,
        mailer: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            records,
            mailer,
        }
    }
}
