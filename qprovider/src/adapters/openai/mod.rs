mod provider;
mod transport;
mod wire;

pub use provider::OpenAiProvider;
pub use transport::{OpenAiHttpTransport, OpenAiTransport};
pub use wire::{ApiFunction, ApiRequest, ApiTool};
