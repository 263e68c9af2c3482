pub mod leave;
pub mod profile;

pub use leave::LeaveRequestRepository;
pub use profile::{AvatarUpload, ProfileRepository};
