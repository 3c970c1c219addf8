#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

//! Client-side case store kept in sync with the case REST API.
//!
//! [`CaseStore`] owns the live, archived and dropdown lists plus the current
//! selection. Side effects go through [`Capabilities`], which the shell (or a
//! test) provides.

pub mod capabilities;
pub mod case;
pub mod config;
pub mod error;
pub mod gateway;
pub mod model;
pub mod score;
pub mod store;

pub use capabilities::{Capabilities, HttpTransport, Navigator, NoopNavigator};
pub use case::{CaseEntity, CaseHandle};
pub use config::{ConfigError, StoreConfig};
pub use error::{AppError, AppResult, ErrorKind, ErrorSeverity};
pub use gateway::CaseGateway;
pub use model::{filter_cases, Case, CaseNo, CloneOptions, NewCase, UnixTimeMs};
pub use score::{LastScore, ScoreData};
pub use store::CaseStore;
