pub mod notification;
pub mod push_token_service;
