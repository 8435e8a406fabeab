pub mod backend;
pub mod config;
pub mod error;
pub mod input;
pub mod lifecycle;
pub mod panel;
pub mod protocol;
pub mod relay;
pub mod reveal;
pub mod state;
pub mod storage;

// Re-export main types for convenience
pub use backend::{BackendClient, HealthStatus};
pub use config::Config;
pub use error::{BackendError, ConfigError, ProtocolError, SetupError, StorageError, TabQueryError};
pub use input::InputField;
pub use lifecycle::PanelSurface;
pub use panel::{ChatPanel, PanelState, ReplyDisposition};
pub use protocol::{RelayEnvelope, RelayReply, RelayRequest, RelayResponse, RequestId, WireMessage};
pub use relay::{Relay, RelayHandle, TabQuery};
pub use reveal::{Reveal, RevealFrame, RevealTask};
pub use state::{ChatMessage, ChatRole, Transcript};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
