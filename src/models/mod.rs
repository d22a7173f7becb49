pub mod context;
pub mod events;
pub mod session;

pub use context::{Permission, SecurityContext, SecurityLevel};
pub use events::{FailedAttempt, SecurityEvent, SecurityEventType, Severity};
pub use session::{SessionFlags, SessionRecord, SessionStatus};
