pub mod dev_stream;
pub mod health;
pub mod send_message;
