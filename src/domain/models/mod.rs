mod api;
mod session;
mod settings;
mod store;
mod sync;

pub use api::*;
pub use session::*;
pub use settings::*;
pub use store::*;
pub use sync::*;
