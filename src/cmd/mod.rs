mod align;
mod config;
mod crop;
mod make;
mod serve;

pub use align::cmd_align;
pub use config::cmd_config;
pub use crop::cmd_crop;
pub use make::cmd_make;
pub use serve::cmd_serve;
