pub use builder::*;
pub use session::*;
pub use store::*;

mod builder;
mod session;
mod store;
