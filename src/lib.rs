//! PsychGuide: mental-health intake to diagnosis-plan request orchestration.
//!
//! A patient fills in an intake form; the form is validated, rendered into a
//! stable prompt, sent to an LLM completion provider with bounded timeouts and
//! retries, and the reply (or a classified failure) is turned into a message
//! for whatever display surface is attached.
//!
//! Data flow: form source -> [`controller::SubmissionController`] ->
//! {[`config::resolver::ConfigResolver`], [`prompt::PromptBuilder`]} ->
//! [`client::CompletionClient`] -> [`presenter::ResultPresenter`] -> display sink.
//!
//! See `DESIGN.md` for the component breakdown.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod controller;
pub mod intake;
pub mod logging;
pub mod presenter;
pub mod prompt;
pub mod providers;
pub mod redactor;
pub mod secrets;
pub mod sink;
