pub mod push_token;

pub use push_token::PushTokenRecord;
