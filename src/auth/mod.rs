pub mod jwt;
pub mod session;

pub use jwt::Claims;
pub use session::SessionContext;
