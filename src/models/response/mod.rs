pub mod message_with_attachments;
