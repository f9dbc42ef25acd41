mod rate_limiter;
mod scheduler;
mod semaphore;
mod sync_controller;

pub use rate_limiter::*;
pub use scheduler::*;
pub use semaphore::*;
pub use sync_controller::*;
