pub mod extract;
pub mod model_llm;
pub mod sst;
pub mod store;
pub mod tts;

pub use extract::Utf8TextExtractor;
pub use model_llm::{OpenAiModelAdapter, UnconfiguredModelAdapter};
pub use sst::{OpenAiSttAdapter, UnavailableSttAdapter};
pub use store::SqliteStore;
pub use tts::{OpenAiTtsAdapter, UnavailableTtsAdapter};
