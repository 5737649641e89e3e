#![forbid(unsafe_code)]

//! # chainquery
//!
//! Ask questions about the Ethereum mainnet public dataset in plain English.
//!
//! A hosted model translates the question into BigQuery SQL, the SQL is shown
//! for review (generation is cheap, execution is billed), and on approval it
//! runs against the warehouse. Accepted query/result pairs can be saved as
//! few-shot examples that guide future generations.
//!
//! The crate is built around an explicit query lifecycle: a [`session::Session`]
//! moves through tagged states under the control of
//! [`controller::QueryLifecycleController`], with the model, the warehouse,
//! and the example file behind narrow trait seams so every piece can be
//! substituted in tests.

pub mod config;
pub mod controller;
pub mod export;
pub mod fewshot;
pub mod gateway;
pub mod prompts;
pub mod session;
pub mod warehouse;

pub use controller::{ControllerConfig, QueryLifecycleController};
pub use fewshot::{Example, FewshotStore, ResultPreview};
pub use session::{ErrorKind, ErrorRecord, Session, SessionState, TabularResult};
