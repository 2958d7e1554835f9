pub mod converter;
pub mod mock;
pub mod provider;
pub mod reliable;

pub use mock::{MockProvider, MockResponse};
pub use provider::{OpenAiCompatConfig, OpenAiCompatProvider};
pub use reliable::{ReliableConfig, ReliableProvider};
