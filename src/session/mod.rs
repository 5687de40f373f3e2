pub mod coordinator;
pub mod descriptor;
pub mod signals;
pub mod timeout;

pub use coordinator::{Credentials, SessionCoordinator, SessionError};
pub use descriptor::{AuthState, SessionDescriptor, SessionResource, SessionUser};
pub use signals::{AuthSignal, Route, SignalBus};
pub use timeout::{TimeoutTracker, TrackerState};
