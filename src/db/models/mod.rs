pub mod community;
pub mod member;
pub mod session;
pub mod tally;

pub use community::{CommunityConfig, CommunityId};
pub use member::MemberId;
pub use session::{LiveSession, SessionId};
pub use tally::{HandleCount, Metric, TallyRecord};
