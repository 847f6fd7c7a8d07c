pub mod aggregator;
pub mod client;
pub mod decoder;
pub mod stream;
pub mod transport;

pub use aggregator::{AggregatorState, Disposition, Snapshot, StreamAggregator};
pub use client::{Client, ClientConfig};
pub use decoder::{decode_event, decode_response};
pub use stream::{ChatStream, StreamUpdate};
pub use transport::{FrameStream, HttpTransport, Transport};
