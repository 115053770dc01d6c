//! Local notification fan-out over a UNIX domain socket.
//!
//! Clients connect, subscribe to the notification types they care about,
//! and receive `{"method": <type>, "params": {...}}` messages framed with a
//! 32-bit big-endian length prefix. Delivery is lossless per session (each
//! session drains its own queue in publish order); misbehaving sessions
//! are closed without affecting the rest.

mod frame;
mod limiter;
mod server;

pub use frame::{Decoder, FrameError, HEADER_SIZE, MAX_MESSAGE_SIZE, encode};
pub use limiter::RateLimiter;
pub use server::{NotifServer, NotifServerConfig};
