pub mod discovery;
pub mod dispatcher;
pub mod errors;
pub mod management;
pub mod metrics;
pub mod protocol;
pub mod server;

pub use discovery::{run_discovery, DiscoveryConfig, DiscoveryHandle, DISCOVERY_PORT};
pub use dispatcher::{DispatchOutcome, Dispatcher, Method, DRIVER_NAME, DRIVER_VERSION};
pub use errors::AlpacaError;
pub use management::ServerDescription;
pub use metrics::{init_metrics, serve_metrics};
pub use protocol::{Envelope, Params};
pub use server::{run_http, HttpConfig, ServerError};
