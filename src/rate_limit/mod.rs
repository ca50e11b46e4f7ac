pub mod bucket;
pub mod gate;
pub mod middleware;
pub mod policy;
pub mod store;

pub use bucket::Bucket;
pub use gate::{BackendAlert, GateOutcome, LogAlert, LoginGate, LOGIN_SCOPE};
pub use middleware::{extract_identity, login_rate_limit_middleware};
pub use policy::{Decision, LimiterPolicy, Outcome};
pub use store::{build_store, BucketStore, LocalStore};
