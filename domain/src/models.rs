mod avatar;
mod player;
mod ranking_snapshot;
mod sighting;

pub use avatar::{Avatar, AvatarRef};
pub use player::{PlayerIdentifier, PlayerRecord, Rating};
pub use ranking_snapshot::RankingSnapshot;
pub use sighting::{avatar_refs, attach_avatars, EnrichedSighting, RawSighting, Sighting};
