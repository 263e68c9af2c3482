pub mod leave_request;
pub mod profile;
pub mod role;

pub use leave_request::{
    LeaveRequest, LeaveRequestWithRequester, LeaveStatus, NewLeaveRequest, StatusFilter,
    leave_type_label,
};
pub use profile::{Profile, ProfilePatch};
pub use role::Role;
