mod provider;
mod sanitize;
mod streaming;

pub use provider::AnthropicProvider;
