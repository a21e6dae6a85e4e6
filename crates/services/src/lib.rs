#![forbid(unsafe_code)]

pub mod app_services;
pub mod credit_service;
pub mod error;
pub mod progress_service;

pub use learn_core::{Clock, DayBoundary};

pub use app_services::AppServices;
pub use credit_service::{CreditService, LEDGER_KEY};
pub use error::{AppServicesError, CreditError, ProgressServiceError};
pub use progress_service::ProgressService;
