mod handlers;
mod models;
mod state;

pub use handlers::{build_router, run_server};
pub use models::{DetectRequest, ErrorResponse, ServiceInfo};
pub use state::ServerState;
