pub mod album;
pub mod auth;
pub mod download;
pub mod genre;
pub mod playlist;
pub mod settings;

pub use album::*;
pub use auth::*;
pub use download::*;
pub use genre::*;
pub use playlist::*;
pub use settings::*;
