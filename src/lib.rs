//! Case lifecycle and assignment workflow for animal-rescue coordination.
//!
//! Reported cases move through Open → Assigned → InProgress → Resolved →
//! Closed. Every change goes through [`engine::WorkflowEngine`], which runs the
//! pure [`state_machine::StateMachine`] and commits through a versioned
//! compare-and-swap on a [`store::CaseStore`], so concurrent responders can
//! never leave a case with a status that disagrees with its helpers.

pub mod audit;
pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod script;
pub mod state_machine;
pub mod store;
