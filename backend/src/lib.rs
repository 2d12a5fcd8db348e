pub mod airtable;
pub mod client;
pub mod config;
pub mod emails;
pub mod error;
pub mod form;
pub mod mailer;
pub mod models;
pub mod records;
pub mod routes;
pub mod state;
pub mod units;

pub mod utils {
    pub mod json;
}

pub use routes::create_router;
pub use state::AppState;
