pub mod cloudinary;
pub mod db;
pub mod gemini_llm;
pub mod http;
pub mod openai_llm;
pub mod publisher;
pub mod tts;
pub mod wikipedia;

pub use cloudinary::{CloudinaryAdapter, CloudinaryCredentials};
pub use db::DbAdapter;
pub use gemini_llm::GeminiTextAdapter;
pub use openai_llm::OpenAiTextAdapter;
pub use publisher::BroadcastPublisher;
pub use tts::OpenAiTtsAdapter;
pub use wikipedia::WikipediaAdapter;
