mod pool;
mod state;
mod types;

pub use pool::{BrowserSession, CreateOptions, SessionPool, SessionStatus};
pub use state::{transition, CleanupPolicy, Effect, Event, SessionState, TransitionError};
pub use types::{LifecycleState, Priority, SessionKey};
