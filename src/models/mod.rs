mod donation;
mod payment_session;
mod subscription;
mod target;
mod user;
mod webhook_event;

pub use donation::*;
pub use payment_session::*;
pub use subscription::*;
pub use target::*;
pub use user::*;
pub use webhook_event::*;
