pub mod parser;
pub mod poller;

pub use parser::{PlaylistParser, is_master_playlist};
pub use poller::{PlaylistPoller, poll_once};
