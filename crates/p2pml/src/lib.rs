// Peer-assisted HLS loader: a local proxy that rewrites manifests and routes
// segment fetches through an external delivery engine.
pub mod bridge;
pub mod config;
pub mod error;
pub mod http_client;
pub mod loader;
pub mod model;
pub mod parser;
pub mod playback;
pub mod server;
pub mod service;
pub mod state;
pub mod store;
pub mod url_codec;

// Export common types for ease of use
pub use bridge::{EngineBridge, EngineCommand};
pub use config::LoaderConfig;
pub use error::{FetchFault, LoaderError, ParseFault, Result};
pub use loader::{Loader, LoaderState};
pub use model::{ByteRange, Segment, SegmentRequest, Stream, StreamType, UpdateStreamParams};
pub use playback::{ExternalPlaybackProvider, PlaybackInfo, PlaybackProvider, StaticPlaybackProvider};
pub use service::HlsParserService;
pub use state::EngineStateGate;
