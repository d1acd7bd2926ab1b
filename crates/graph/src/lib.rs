//! The reasoning graph: a small DAG of nodes over [`state::TurnState`] with
//! an interrupt set for human-in-the-loop review, checkpointed after every
//! step.
//!
//! Cycles (review → orchestrator → review) are expressed as tagged node
//! variants plus a pure routing function, not mutual recursion; suspension
//! is an [`graph::GraphOutcome::Interrupted`] return and an external
//! `resume` call.

pub mod archive;
pub mod checkpoint;
pub mod graph;
pub mod memory;
pub mod nodes;
pub mod router;
pub mod state;
pub mod token_budget;

pub use checkpoint::Checkpointer;
pub use graph::{GraphOutcome, ReasoningGraph, ResumeUpdate, TurnInput};
pub use router::{route_after_orchestrator, Node};
pub use state::TurnState;
