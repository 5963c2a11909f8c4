// * Browser session layer: launch, navigation, DOM snapshots and pacing

pub mod errors;
pub mod session;
pub mod throttle;

pub use errors::SessionError;
pub use session::{ChromiumSession, ChromiumSessionFactory, PortalSession, SessionFactory, SessionFuture};
pub use throttle::NavigationThrottle;
