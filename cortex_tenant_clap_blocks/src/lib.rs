//! Building blocks for [`clap`]-driven configs.
//!
//! They can easily be re-used using `#[clap(flatten)]`.
pub mod logging;
pub mod tenant;
pub mod tokio;
pub mod upstream;
