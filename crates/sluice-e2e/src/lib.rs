//! Test support for the sluice control-plane client.

mod mock_control;

pub use mock_control::{error, ok, MockControlPlane, RecordedRequest, ScriptedResponse};
