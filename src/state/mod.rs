//! Sans-I/O state machines for PostgreSQL protocol.
//!
//! These state machines handle the protocol logic without performing any I/O.
//! Startup and simple queries produce [`Action`] values that tell the caller
//! what to do next; the batch machine produces [`BatchEvent`]s that the
//! row-by-row readers in the front-ends pull one at a time.

pub mod action;
pub mod batch;
pub mod connection;
pub mod simple_query;

use crate::buffer_set::BufferSet;
use crate::error::Result;

pub use action::{Action, AsyncMessage};
pub use batch::{BatchEvent, BatchStateMachine};
pub use connection::ConnectionStateMachine;
pub use simple_query::SimpleQueryStateMachine;

/// A protocol exchange driven by [`Action`]s.
pub trait StateMachine {
    /// Begin the exchange, usually by filling `buffer_set.write_buffer`.
    fn start(&mut self, buffer_set: &mut BufferSet) -> Result<Action>;

    /// Process the message in `buffer_set` and return the next action.
    fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action>;
}
