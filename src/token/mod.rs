mod proxy;
mod state;

pub use proxy::TokenProxy;
pub use state::{RefreshResponse, TokenState, unix_now};
