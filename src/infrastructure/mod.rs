pub mod backend;
pub mod launcher;
pub mod session;
pub mod simulated;
#[cfg(windows)]
pub mod windows_uia;

pub use backend::{ElementId, ElementState, UiBackend};
pub use launcher::{attach_or_launch, TargetBackend};
pub use session::{AppSession, ControlHandle};
pub use simulated::{SimControl, SimWorld, SimulatedApp};
