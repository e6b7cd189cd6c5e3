pub mod config_base;
pub mod connection;
pub mod profile;
pub mod user;

pub use config_base::{Commands, Config, DumpFiles};
pub use connection::Connection;
pub use profile::Profile;
pub use user::GrantUser;
