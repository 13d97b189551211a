pub mod auth;
pub mod browser;
pub mod collector;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod poller;
pub mod reporter;
pub mod state;
pub mod surface;
pub mod types;

/// Marketplace profile page; hosts the order listing tabs.
pub const FACTORY_HOME_URL: &str = "https://www.boostingfactory.com/profile";

/// Marketplace login form.
pub const FACTORY_LOGIN_URL: &str = "https://www.boostingfactory.com/login";

/// Path fragment both sites redirect to when the session is gone.
pub const LOGIN_PATH_MARKER: &str = "/login";

/// Token carried by messages sent to every channel member.
pub const BROADCAST_MARKER: &str = "@everyone";

/// Literal that precedes the order identifier in announcements.
pub const ORDER_ID_MARKER: &str = "order id: ";
