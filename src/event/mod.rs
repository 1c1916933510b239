//! Event vocabulary and the fan-out primitive that carries it.

pub mod hub;
pub mod schema;

pub use hub::EventHub;
pub use schema::{
    AgentEvent, BridgeCommand, BridgeState, DEFAULT_AGENT_ID, SYSTEM_AGENT_ID, SubTaskOutcome,
};
