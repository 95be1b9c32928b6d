pub mod channel;
pub mod error;
pub mod manager;
pub mod room;
pub mod types;

pub use error::ChannelError;
pub use manager::{recent_window, ChannelManager, ChannelUpdate};
pub use room::TopicRoom;
pub use types::{Attachment, ChannelInfo, LogEntry, Message, MessageFormat, MessageStatus};
