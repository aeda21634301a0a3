pub mod codec;
pub mod envelope;
pub mod handshake;
pub mod proto;
pub mod session;
