pub mod logging;
pub mod message;
pub mod time;

pub use message::{Message, MessageId};
pub use time::{Clock, ManualClock, SystemClock};
pub use tracing;
