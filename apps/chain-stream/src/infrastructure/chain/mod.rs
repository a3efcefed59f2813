//! Chain Feed Adapters
//!
//! Implements the transport ports for upstream chain sources:
//!
//! - **Push**: WebSocket stream of full snapshots
//! - **Poll**: HTTP snapshot endpoint
//! - **Codec**: upstream JSON to [`Snapshot`](crate::domain::snapshot::Snapshot)

pub mod codec;
pub mod poll;
pub mod push;

pub use codec::{CodecError, MAX_POLL_ROWS, normalize_poll_body, parse_push_frame};
pub use poll::HttpPollSource;
pub use push::WsPushTransport;
