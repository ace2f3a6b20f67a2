pub mod conversation;
pub mod message;

pub use conversation::ConversationKey;
pub use message::{Attachment, DeliveryStatus, Message, MessageType, NewMessage};
