pub mod constants;
pub mod types;

pub use constants::*;
pub use crossbeam_channel as channel;
pub use types::*;
