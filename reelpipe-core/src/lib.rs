pub mod config;
pub mod logging;
pub mod session;
pub mod source;

pub use config::{load_config, Config};
pub use session::PlaybackSession;
pub use source::{MediaKind, ResolvedStream};
