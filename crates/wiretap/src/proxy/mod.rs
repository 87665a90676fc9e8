mod handler;
mod server;
mod session;
mod streaming;

pub use handler::handle_proxy;
pub use server::{create_router, AppState, ProxyServer};
pub use session::{strip_session_prefix, SessionId, SessionIdError};
pub use streaming::StreamInterceptor;
