pub mod codec;
pub mod consensus;

pub use codec::{PeerPacket, PeerSyncCodec, PACKET_LEN};
pub use consensus::{PeerConsensusFuser, PeerEstimate};
