pub mod patch;
pub mod project;
pub mod release;
pub mod util;

pub use patch::*;
pub use project::*;
pub use release::*;
pub use util::*;
