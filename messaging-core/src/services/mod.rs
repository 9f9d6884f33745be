pub mod analytics_service;
pub mod conversation_service;
pub mod message_service;
pub mod presence_service;
pub mod retention_service;
pub mod search_service;
pub mod typing_service;
