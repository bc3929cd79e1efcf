// HTTP API routers

pub mod connections;
pub mod error;
pub mod oauth;
pub mod profiles;
pub mod refresh;

pub use connections::{create_connections_router, ConnectionsAppState};
pub use error::ApiError;
pub use oauth::{create_oauth_router, run_state_cleanup, OAuthAppState, StateManager};
pub use profiles::{create_profiles_router, ProfilesAppState};
pub use refresh::{create_refresh_router, RefreshAppState};
